//! Upstream HTTP client abstraction.
//!
//! [`HttpClient`] is the only seam through which bytes leave the process.
//! It returns a plain future resolving to a fully-buffered
//! [`UpstreamResponse`]; caching and de-duplication are layered on top by
//! [`FetchCoordinator`](super::FetchCoordinator) rather than by wrapping
//! the response itself.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};

use crate::{FanartError, Result};

/// A completed upstream response with its body received in full.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can perform a single HTTP request.
///
/// Implementations must only return once the body has been received in
/// full (or the transfer has failed).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(
        &self,
        method: &Method,
        uri: &str,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse>;
}

/// [`HttpClient`] backed by `reqwest`. Follows redirects.
#[derive(Clone)]
pub struct ReqwestClient {
    http: Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FanartError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(
        &self,
        method: &Method,
        uri: &str,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse> {
        let response = self
            .http
            .request(method.clone(), uri)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

impl ReqwestClient {
    fn map_error(&self, err: reqwest::Error) -> FanartError {
        if err.is_timeout() {
            FanartError::Timeout(self.timeout)
        } else {
            FanartError::from(err)
        }
    }
}
