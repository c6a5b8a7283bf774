//! Plugin token endpoint

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
    Form,
};
use errors::KeelError;
use std::sync::Arc;

use crate::api::dto::TokenRequest;
use crate::app_state::AppState;
use crate::token::{parse_basic, TokenResponse};

/// Exchange plugin client credentials for a token
///
/// Credentials come from `Authorization: Basic` or from the
/// `client_id`/`client_secret` form fields. The header wins when both are
/// present.
///
/// @route POST /v1/oauth2/token
/// @output Json<TokenResponse> - OAuth2 token response
/// @side-effects None
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Json<TokenResponse>, KeelError> {
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    let (client_id, client_secret) = match (basic, form) {
        (Some(pair), _) => pair,
        (None, Ok(Form(req))) => match (req.client_id, req.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(missing_credentials()),
        },
        (None, Err(_)) => return Err(missing_credentials()),
    };

    let resp = state.tokens.issue(&client_id, &client_secret).await?;
    Ok(Json(resp))
}

fn missing_credentials() -> KeelError {
    KeelError::Unauthorized("client credentials required".to_string())
}
