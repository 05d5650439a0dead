//! Content delivery over HTTP.

use super::{ByteRange, ContentFetcher, FetchResponse};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, HeaderName, RANGE};
use std::io;
use tokio_util::io::StreamReader;

/// Fetches asset content with plain `GET` requests against delivery URLs.
///
/// No retries happen here; ranged-read verification and its retry loop
/// live in the transfer engine.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport("failed to build HTTP client".to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Uses an existing client (shared connection pool, custom timeouts).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Client errors won't change on retry, except a timeout or throttling.
fn status_error(url: &str, status: StatusCode) -> ErrorKind {
    let message = format!("GET {url}: {status}");
    let transient = matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS);
    match status.is_client_error() && !transient {
        true => ErrorKind::Remote(message),
        false => ErrorKind::Transport(message),
    }
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, range: Option<ByteRange>) -> Result<FetchResponse> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }
        let response = request
            .send()
            .await
            .or_raise(|| ErrorKind::Transport(format!("GET {url}")))?;
        let status = response.status();
        let response = response.error_for_status().or_raise(|| status_error(url, status))?;

        let accept_ranges = header(response.headers(), ACCEPT_RANGES);
        let content_length = header(response.headers(), CONTENT_LENGTH);
        tracing::trace!(url, status = %response.status(), ?accept_ranges, ?content_length, "Fetched content");
        let body = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        Ok(FetchResponse {
            accept_ranges,
            content_length,
            body: Box::pin(body),
        })
    }
}
