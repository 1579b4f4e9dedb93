use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method,
};
use shared::protocol::{HttpMethod, RequestOptions};

use crate::error::OrchestratorError;

pub(crate) fn build_url(base: Option<&str>, endpoint: &str) -> String {
    format!("{}{endpoint}", base.unwrap_or_default())
}

pub(crate) fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// `Content-Type: application/json` plus the caller's headers; a caller header with
/// the same (case-insensitive) name replaces the default.
pub(crate) fn build_headers(options: &RequestOptions) -> Result<HeaderMap, OrchestratorError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in &options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            OrchestratorError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            }
        })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|err| OrchestratorError::InvalidHeader {
                name: name.clone(),
                reason: err.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
