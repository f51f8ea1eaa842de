//! Caching, de-duplicating front for upstream HTTP.
//!
//! [`FetchCoordinator`] decorates an [`HttpClient`] with two guarantees for
//! `GET` requests:
//!
//! - a fresh cached response is served without touching the network
//! - at most one upstream request per cache key is in flight at any time;
//!   concurrent callers join the running fetch and receive the same result
//!
//! # Request flow
//!
//! ```text
//! request(GET, uri)
//!        │
//!        ▼
//!   cache hit? ──yes──► cached head + body
//!        │ no
//!        ▼
//!   in-flight? ──yes──► register waiter ──► wait
//!        │ no
//!        ▼
//!   register fetch, re-check cache, spawn upstream request
//!        │
//!        ▼
//!   2xx: write head + body to cache
//!   remove in-flight entry, release waiters in registration order
//! ```
//!
//! The upstream request runs on its own task so that a caller going away
//! (e.g. a client disconnect) never strands the other waiters. Failures are
//! handed to every waiter and never cached. Other methods go straight to
//! the client.

pub mod client;

pub use client::{HttpClient, ReqwestClient, UpstreamResponse};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reqwest::Method;
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::{CacheValue, CachedHead, SharedCache};
use crate::telemetry;
use crate::{FanartError, Result};

/// Default bound on a single upstream request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

type Waiter = oneshot::Sender<Result<UpstreamResponse>>;

/// A fetch in progress and the callers waiting on it, in arrival order.
struct InFlightFetch {
    waiters: Vec<Waiter>,
}

struct Inner {
    client: Arc<dyn HttpClient>,
    cache: Arc<SharedCache>,
    in_flight: DashMap<String, InFlightFetch>,
    timeout: Duration,
}

/// Caching decorator around an [`HttpClient`].
///
/// Cheap to clone; clones share the cache and the in-flight registry.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl FetchCoordinator {
    /// Create a coordinator writing into `cache`, with the default timeout.
    pub fn new(client: Arc<dyn HttpClient>, cache: Arc<SharedCache>) -> Self {
        Self::with_timeout(client, cache, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a coordinator whose upstream requests give up after `timeout`.
    pub fn with_timeout(
        client: Arc<dyn HttpClient>,
        cache: Arc<SharedCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cache,
                in_flight: DashMap::new(),
                timeout,
            }),
        }
    }

    /// The cache this coordinator writes into.
    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.inner.cache
    }

    /// Number of upstream fetches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Perform a request, serving `GET` from cache or a shared in-flight
    /// fetch where possible.
    ///
    /// Any status is returned as `Ok`; only transport failures and timeouts
    /// are errors. Only 2xx responses are cached.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: HeaderMap,
    ) -> Result<UpstreamResponse> {
        if method != Method::GET {
            return self.inner.send(&method, uri, &headers).await;
        }

        let key = cache_key(&method, uri);
        if let Some(response) = self.inner.cached(&key) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => "response").increment(1);
            debug!(uri, "serving upstream response from cache");
            return Ok(response);
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => "response").increment(1);

        let (tx, rx) = oneshot::channel();
        let leader = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(mut fetch) => {
                fetch.get_mut().waiters.push(tx);
                metrics::counter!(telemetry::COALESCED_REQUESTS_TOTAL).increment(1);
                debug!(uri, "joining in-flight fetch");
                false
            }
            Entry::Vacant(slot) => {
                // A fetch for this key may have completed between the cache
                // check above and taking the registration lock.
                if let Some(response) = self.inner.cached(&key) {
                    return Ok(response);
                }
                slot.insert(InFlightFetch { waiters: vec![tx] });
                true
            }
        };

        if leader {
            let guard = InFlightGuard {
                inner: Arc::clone(&self.inner),
                key,
                completed: false,
            };
            let uri = uri.to_owned();
            tokio::spawn(async move {
                let result = guard.inner.send(&method, &uri, &headers).await;
                guard.complete(result);
            });
        }

        rx.await.map_err(|_| {
            FanartError::Internal(format!("fetch for {uri} ended without a result"))
        })?
    }

    /// `GET` that treats any non-2xx status as an error.
    pub async fn get(&self, uri: &str, headers: HeaderMap) -> Result<UpstreamResponse> {
        let response = self.request(Method::GET, uri, headers).await?;
        if !response.is_success() {
            return Err(FanartError::UpstreamStatus {
                status: response.status.as_u16(),
                url: uri.to_string(),
            });
        }
        Ok(response)
    }
}

impl Inner {
    /// Send one request on the network, bounded by the timeout.
    async fn send(
        &self,
        method: &Method,
        uri: &str,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse> {
        debug!(%method, uri, "upstream request");
        let request = self.client.execute(method, uri, headers);
        let result = tokio::time::timeout(self.timeout, request)
            .await
            .unwrap_or(Err(FanartError::Timeout(self.timeout)));

        let status = match &result {
            Ok(response) => response.status.as_str().to_owned(),
            Err(e) => {
                warn!(%method, uri, error = %e, "upstream request failed");
                "error".to_owned()
            }
        };
        metrics::counter!(telemetry::UPSTREAM_REQUESTS_TOTAL, "status" => status).increment(1);
        result
    }

    /// Rebuild a cached response. Both head and body must still be fresh.
    fn cached(&self, key: &str) -> Option<UpstreamResponse> {
        let Some(CacheValue::Head(head)) = self.cache.read(key) else {
            return None;
        };
        let Some(CacheValue::Body(body)) = self.cache.read(&body_key(key)) else {
            return None;
        };
        Some(UpstreamResponse {
            status: head.status,
            headers: head.headers,
            body,
        })
    }

    fn store(&self, key: &str, response: &UpstreamResponse) {
        self.cache
            .write(body_key(key), CacheValue::Body(response.body.clone()));
        self.cache.write(
            key,
            CacheValue::Head(CachedHead {
                status: response.status,
                headers: response.headers.clone(),
            }),
        );
    }
}

/// Owns the leader's in-flight registration.
///
/// Dropping it without calling [`complete`](Self::complete) (e.g. if the
/// fetch task panics) still removes the registration, so waiters see a
/// closed channel instead of hanging.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
    completed: bool,
}

impl InFlightGuard {
    fn complete(mut self, result: Result<UpstreamResponse>) {
        self.completed = true;

        // Cache first, then deregister: anyone arriving after the removal
        // finds the cached copy when re-checking under the registration lock.
        if let Ok(response) = &result {
            if response.is_success() {
                self.inner.store(&self.key, response);
            }
        }

        if let Some((_, fetch)) = self.inner.in_flight.remove(&self.key) {
            debug!(key = %self.key, waiters = fetch.waiters.len(), "releasing waiters");
            for waiter in fetch.waiters {
                // A waiter whose caller went away is not an error.
                let _ = waiter.send(result.clone());
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // After completion the key may already belong to a newer fetch.
        if !self.completed {
            self.inner.in_flight.remove(&self.key);
        }
    }
}

/// Cache key for an upstream response: `<METHOD>/<hex sha256 of uri>`.
pub fn cache_key(method: &Method, uri: &str) -> String {
    format!("{method}/{:x}", Sha256::digest(uri.as_bytes()))
}

fn body_key(key: &str) -> String {
    format!("{key}/body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic() {
        let a = cache_key(&Method::GET, "http://example.com/a");
        let b = cache_key(&Method::GET, "http://example.com/a");
        assert_eq!(a, b);
        assert!(a.starts_with("GET/"));
        assert_eq!(a.len(), "GET/".len() + 64);
    }

    #[test]
    fn cache_key_differs_on_uri() {
        assert_ne!(
            cache_key(&Method::GET, "http://example.com/a"),
            cache_key(&Method::GET, "http://example.com/b")
        );
    }

    #[test]
    fn cache_key_differs_on_method() {
        assert_ne!(
            cache_key(&Method::GET, "http://example.com/a"),
            cache_key(&Method::HEAD, "http://example.com/a")
        );
    }

    #[test]
    fn body_key_extends_head_key() {
        assert_eq!(body_key("GET/abc"), "GET/abc/body");
    }
}
