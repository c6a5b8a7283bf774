//! Runtime administration

use axum::response::Json;
use common::{LogLevelResponse, SetLogLevelRequest, SuccessResponse};
use errors::KeelError;
use tracing::info;

/// @route GET /v1/admin/logs/level
pub async fn get_log_level() -> Json<SuccessResponse<LogLevelResponse>> {
    Json(SuccessResponse::new(LogLevelResponse {
        level: common::logging::get_log_level(),
    }))
}

/// Change the log filter without a restart
///
/// @route PUT /v1/admin/logs/level
/// @input Json<SetLogLevelRequest> - filter directive such as "debug"
pub async fn set_log_level(
    Json(req): Json<SetLogLevelRequest>,
) -> Result<Json<SuccessResponse<LogLevelResponse>>, KeelError> {
    common::logging::set_log_level(&req.level).map_err(KeelError::InvalidArgument)?;
    info!("Log level changed to {}", req.level);
    Ok(Json(SuccessResponse::new(LogLevelResponse { level: req.level })))
}
