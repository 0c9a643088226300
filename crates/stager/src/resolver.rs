//! Update resolution
//!
//! Turns a [`ReleaseConfig`] into the archive URL to download. A direct URL
//! short-circuits everything; otherwise the update endpoint is queried and its
//! `{ "success": .., "value": { "url": .. } }` envelope is unwrapped.

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{FetchOptions, ReleaseConfig};
use crate::error::{Result, StageError};

/// Message used when the update endpoint returns nothing worth echoing back
pub const GENERIC_RESOLUTION_FAILURE: &str = "Failed to get latest update.";

/// The release selected by the update check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub url: String,
    /// Any other fields of the `value` object, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UpdateResult {
    pub fn from_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Resolves the archive URL for a release configuration
pub struct UpdateResolver {
    client: Client,
}

impl UpdateResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolve the download target, querying the update endpoint only when needed
    pub async fn resolve(&self, config: &ReleaseConfig) -> Result<UpdateResult> {
        if let Some(url) = config.direct_url() {
            debug!("Using direct URL {}", url);
            return Ok(UpdateResult::from_url(url));
        }

        let update_url = config.update_url().ok_or_else(|| StageError::Configuration {
            message: "neither directURL nor updateURL is set".to_string(),
            field: Some("updateURL".to_string()),
            suggestion: Some("Provide a direct archive URL or an update endpoint".to_string()),
        })?;

        let options = config.fetch_options.clone().unwrap_or_default();
        let body = self.fetch_envelope(update_url, &options).await?;
        debug!("Update check response: {}", body);

        let result = parse_envelope(update_url, &body)?;
        info!("Update check resolved {}", result.url);
        Ok(result)
    }

    async fn fetch_envelope(&self, url: &str, options: &FetchOptions) -> Result<String> {
        let method = match options.method.as_deref() {
            Some(name) => Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|_| {
                StageError::Configuration {
                    message: format!("'{name}' is not a valid HTTP method"),
                    field: Some("fetchOptions.method".to_string()),
                    suggestion: None,
                }
            })?,
            None => Method::GET,
        };

        let mut request = self.client.request(method, url);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if let Some(ref body) = options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| StageError::HttpRequest {
            url: url.to_string(),
            source: e,
        })?;

        response.text().await.map_err(|e| StageError::HttpRequest {
            url: url.to_string(),
            source: e,
        })
    }
}

/// Unwrap a `{ success, value }` envelope into an [`UpdateResult`]
pub fn parse_envelope(url: &str, body: &str) -> Result<UpdateResult> {
    let failure = |message: String| StageError::Resolution {
        url: url.to_string(),
        message,
        body: Some(body.to_string()),
    };

    let document: Value = match serde_json::from_str(body) {
        Ok(document) => document,
        Err(_) => return Err(failure(GENERIC_RESOLUTION_FAILURE.to_string())),
    };

    if !document.get("success").is_some_and(is_truthy) {
        let message = if is_truthy(&document) {
            document.to_string()
        } else {
            GENERIC_RESOLUTION_FAILURE.to_string()
        };
        return Err(failure(message));
    }

    let value = document.get("value").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| failure(format!("update response has no usable value.url: {e}")))
}

/// JSON truthiness as seen by the update endpoints' clients
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
