//! Shared HTTP client construction

use reqwest::Client;

use crate::config::StagerOptions;
use crate::error::{Result, StageError};

/// Build the client used for both the update check and the archive download
pub fn build_client(options: &StagerOptions) -> Result<Client> {
    let mut builder = Client::builder().user_agent(&options.user_agent);
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| StageError::HttpRequest {
        url: "<client>".to_string(),
        source: e,
    })
}
