//! 计数服务 HTTP 客户端

use common::errors::{AppError, AppResult};
use common::models::CountResult;

/// Fetches counts from counting backends.
///
/// Wraps a shared [`reqwest::Client`]; no retry and no timeout beyond the
/// client's defaults.
#[derive(Clone, Default)]
pub struct CountingClient {
    http_client: reqwest::Client,
}

impl CountingClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Issues one GET against `url` and parses the body as a [`CountResult`].
    ///
    /// # Errors
    /// - `AppError::DownstreamUnavailable` on connection failure or non-2xx status
    /// - `AppError::MalformedDownstreamResponse` when the body is not a count record
    pub async fn fetch_count(&self, url: &str) -> AppResult<CountResult> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::DownstreamUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::DownstreamUnavailable(format!(
                "{url} answered HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::DownstreamUnavailable(format!("{url}: {e}")))?;

        serde_json::from_slice(&body)
            .map_err(|e| AppError::MalformedDownstreamResponse(format!("{url}: {e}")))
    }
}
