//! HTTP front end.
//!
//! Serves `GET /fanart?id=<showId>&channel=<channel>&title=<title>` and maps
//! each [`Resolution`] to a redirect:
//!
//! | Outcome | Response |
//! |---|---|
//! | `Confirmed` | `301` + `Location` |
//! | `BestEffort` | `302` + `Location` |
//! | `Pending` | `503` + `Retry-After` |
//! | not found | `404`, `fanart not found` |
//! | bad parameters | `400` |
//! | internal failure | `500` with diagnostic text |
//!
//! `Pending` is a loading signal rather than a failure: the body is empty
//! and clients are expected to retry after the advertised delay. It is sent
//! as a `503` so that caches and media players do not store it.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::cache::{CacheStore, SharedCache};
use crate::fetch::{FetchCoordinator, ReqwestClient};
use crate::resolver::{FanartQuery, Resolution, Resolver};
use crate::{FanartError, Result};

use config::Config;

/// Body of every 404 response.
pub const NOT_FOUND_BODY: &str = "fanart not found";

/// Shared state handed to request handlers.
#[derive(Clone)]
pub struct AppState {
    resolver: Arc<Resolver>,
    cache: Arc<SharedCache>,
    retry_after: Duration,
}

impl AppState {
    pub fn new(resolver: Arc<Resolver>, cache: Arc<SharedCache>, retry_after: Duration) -> Self {
        Self {
            resolver,
            cache,
            retry_after,
        }
    }

    /// Wire up cache, upstream client, coordinator and resolver from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(CacheStore::with_max_entries(
            config.cache.ttl(),
            config.cache.max_entries,
        ));
        let timeout = config.upstream.timeout();
        let client = Arc::new(ReqwestClient::new(timeout)?);
        let fetcher = FetchCoordinator::with_timeout(client, Arc::clone(&cache), timeout);
        let resolver = Resolver::new(fetcher, config.upstream.clone().into())?;
        Ok(Self::new(
            Arc::new(resolver),
            cache,
            Duration::from_secs(config.server.retry_after_secs),
        ))
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/fanart", get(fanart))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically evict expired cache entries.
pub fn spawn_cleanup(cache: Arc<SharedCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.cleanup();
            debug!(entries = cache.len(), "cache cleanup");
        }
    })
}

/// Raw query parameters; presence is checked in [`FanartParams::into_query`].
#[derive(Debug, Default, Deserialize)]
pub struct FanartParams {
    pub id: Option<String>,
    pub channel: Option<String>,
    pub title: Option<String>,
}

impl FanartParams {
    /// Validate parameters into a query.
    ///
    /// All three parameters are required. The show id is substituted into
    /// upstream URLs, so it is restricted to ASCII letters, digits, `-`
    /// and `_`.
    pub fn into_query(self) -> Result<FanartQuery> {
        let id = self
            .id
            .ok_or_else(|| FanartError::InvalidInput("missing parameter: id".into()))?;
        let channel = self
            .channel
            .ok_or_else(|| FanartError::InvalidInput("missing parameter: channel".into()))?;
        let title = self
            .title
            .ok_or_else(|| FanartError::InvalidInput("missing parameter: title".into()))?;

        if id.is_empty() {
            return Err(FanartError::InvalidInput("empty parameter: id".into()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FanartError::InvalidInput(format!("malformed id: {id:?}")));
        }

        Ok(FanartQuery::new(id, channel, title))
    }
}

async fn fanart(
    State(state): State<AppState>,
    params: std::result::Result<Query<FanartParams>, QueryRejection>,
) -> Response {
    let query = match params
        .map_err(|e| FanartError::InvalidInput(e.body_text()))
        .and_then(|Query(params)| params.into_query())
    {
        Ok(query) => query,
        Err(e) => return error_response(e),
    };

    match state.resolver.resolve(&query).await {
        Ok(Resolution::Confirmed(url)) => redirect(StatusCode::MOVED_PERMANENTLY, url),
        Ok(Resolution::BestEffort(url)) => redirect(StatusCode::FOUND, url),
        Ok(Resolution::Pending) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(RETRY_AFTER, state.retry_after.as_secs().to_string())],
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

fn redirect(status: StatusCode, url: String) -> Response {
    match HeaderValue::try_from(url) {
        Ok(location) => (status, [(LOCATION, location)]).into_response(),
        Err(e) => error_response(FanartError::Internal(format!(
            "resolved URL is not a valid Location header: {e}"
        ))),
    }
}

fn error_response(err: FanartError) -> Response {
    let status = match &err {
        FanartError::NotFound => {
            return plain_text(StatusCode::NOT_FOUND, NOT_FOUND_BODY.to_string());
        }
        FanartError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!(error = %err, "fanart request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    plain_text(status, err.to_string())
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, "text/plain")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: Option<&str>, channel: Option<&str>, title: Option<&str>) -> FanartParams {
        FanartParams {
            id: id.map(String::from),
            channel: channel.map(String::from),
            title: title.map(String::from),
        }
    }

    #[test]
    fn complete_params_become_query() {
        let query = params(Some("42"), Some("TEN"), Some("Hot Show"))
            .into_query()
            .unwrap();
        assert_eq!(query, FanartQuery::new("42", "TEN", "Hot Show"));
    }

    #[test]
    fn missing_params_are_invalid_input() {
        for p in [
            params(None, Some("ten"), Some("t")),
            params(Some("42"), None, Some("t")),
            params(Some("42"), Some("ten"), None),
        ] {
            assert!(matches!(p.into_query(), Err(FanartError::InvalidInput(_))));
        }
    }

    #[test]
    fn malformed_id_is_invalid_input() {
        let err = params(Some("../etc"), Some("ten"), Some("t"))
            .into_query()
            .unwrap_err();
        assert!(err.to_string().contains("malformed id"));
        assert!(params(Some(""), Some("ten"), Some("t")).into_query().is_err());
    }

    #[test]
    fn not_found_maps_to_plain_text_404() {
        let response = error_response(FanartError::NotFound);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn internal_errors_map_to_500() {
        let response = error_response(FanartError::Internal("boom".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_location_maps_to_500() {
        let response = redirect(StatusCode::FOUND, "http://a/\nb".to_string());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
