use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::core::errors::{PipelineError, PipelineResult, TransientFailure};

/// Every outbound client carries the configured per-request time bound.
pub fn build_client(timeout: Duration) -> PipelineResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request and decode a JSON body, classifying every failure.
pub async fn send_json(request: RequestBuilder) -> Result<Value, TransientFailure> {
    let response = request.send().await.map_err(TransientFailure::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransientFailure::from_status(status, &body));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| TransientFailure::api_status(status.as_u16(), format!("invalid JSON body: {}", e)))
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
