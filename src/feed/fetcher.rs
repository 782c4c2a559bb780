use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

use crate::sync::shutdown::ShutdownSignal;

/// User agent sent with every feed request.
pub const FEED_USER_AGENT: &str = "gator";

#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status: {status} {reason}")]
    HttpStatus { status: u16, reason: String },
    #[error("fetch cancelled by shutdown")]
    Cancelled,
}

pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(FEED_USER_AGENT)
        .build()
}

/// Performs a single GET of `url`, bounded by `deadline` and cut short by `shutdown`.
///
/// The response is dropped on every early return, which releases the connection.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    deadline: Duration,
    shutdown: &ShutdownSignal,
) -> Result<FetchedFeed, FetchError> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(FetchError::Cancelled),
        result = request_feed(client, url, deadline) => result,
    }
}

async fn request_feed(
    client: &reqwest::Client,
    url: &str,
    deadline: Duration,
) -> Result<FetchedFeed, FetchError> {
    let response = client
        .get(url)
        .header(USER_AGENT, FEED_USER_AGENT)
        .timeout(deadline)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response.bytes().await?.to_vec();

    Ok(FetchedFeed { body, content_type })
}
