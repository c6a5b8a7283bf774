//! Addon route value encoding
//!
//! An entry in a route's `registered_addons` maps an addon point to
//! `"<pluginID>/<endpoint>"`. Plugin ids never contain `/`; endpoints may.

/// Encode the implementer and endpoint of an addon point
pub fn encode(plugin_id: &str, endpoint: &str) -> String {
    format!("{}/{}", plugin_id, endpoint)
}

/// Decode an addon route value into `(plugin_id, endpoint)`
///
/// Splits on the first `/` and drops any `?query` suffix from the endpoint.
/// Returns `None` when there is no separator.
pub fn decode(value: &str) -> Option<(&str, &str)> {
    let (plugin_id, rest) = value.split_once('/')?;
    let endpoint = match rest.split_once('?') {
        Some((path, _query)) => path,
        None => rest,
    };
    Some((plugin_id, endpoint))
}
