//! Caching subsystem.
//!
//! A single [`CacheStore`] is built at startup and shared (behind an `Arc`)
//! by the [`FetchCoordinator`](crate::fetch::FetchCoordinator) and the
//! [`Resolver`](crate::resolver::Resolver). It holds a closed set of value
//! kinds, see [`CacheValue`]:
//!
//! - upstream response heads and bodies, keyed by method and URI hash
//!   (`GET/<sha256>` and `GET/<sha256>/body`)
//! - resolved fanart records, keyed `fanart/<showId>`
//! - the bootstrap sentinel, keyed [`BOOTSTRAP_LOADED_KEY`]

pub mod store;

pub use store::{CacheStore, DEFAULT_MAX_ENTRIES};

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Sentinel key marking the bootstrap dataset as loaded.
pub const BOOTSTRAP_LOADED_KEY: &str = "fanart-bootstrap-loaded";

/// The store type shared across the service.
pub type SharedCache = CacheStore<CacheValue>;

/// Cache key for a resolved fanart record.
pub fn fanart_key(show_id: &str) -> String {
    format!("fanart/{show_id}")
}

/// How much trust a resolved image deserves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    /// Taken from the bootstrap dataset or the show's own page.
    Confirmed,
    /// Heuristic guess from the episode listing; may not be show artwork.
    BestEffort,
}

/// A resolved show → image mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FanartRecord {
    pub url: String,
    pub confidence: Confidence,
}

impl FanartRecord {
    pub fn confirmed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            confidence: Confidence::Confirmed,
        }
    }

    pub fn best_effort(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            confidence: Confidence::BestEffort,
        }
    }
}

/// Status line and headers of a cached upstream response.
///
/// The body lives under its own key so it is only ever published once it
/// has been received in full.
#[derive(Clone, Debug)]
pub struct CachedHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Everything the shared store can hold.
#[derive(Clone, Debug)]
pub enum CacheValue {
    Head(CachedHead),
    Body(Bytes),
    Fanart(FanartRecord),
    Flag,
}
