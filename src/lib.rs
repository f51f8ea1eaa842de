//! Fanart - caching artwork resolution for TV shows
//!
//! This crate answers "what is the artwork image for show X" by layering an
//! in-memory TTL cache over a chain of increasingly expensive upstream
//! lookups: a pre-aggregated bootstrap dataset, the show's episode listing
//! and the show's own page.
//!
//! - [`cache::CacheStore`]: key/value store with per-entry expiry
//! - [`fetch::FetchCoordinator`]: caches upstream `GET`s and coalesces
//!   concurrent identical requests into one network call
//! - [`resolver::Resolver`]: the fallback chain
//! - `server` (feature `server`): the axum front end served by `fanartd`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fanart::cache::CacheStore;
//! use fanart::fetch::{FetchCoordinator, ReqwestClient};
//! use fanart::resolver::{FanartQuery, Resolution, Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> fanart::Result<()> {
//!     let cache = Arc::new(CacheStore::new(Some(Duration::from_secs(60))));
//!     let client = Arc::new(ReqwestClient::new(Duration::from_secs(10))?);
//!     let fetcher = FetchCoordinator::new(client, cache);
//!     let resolver = Resolver::new(fetcher, ResolverConfig::default())?;
//!
//!     match resolver.resolve(&FanartQuery::new("42", "TEN", "Hot Show")).await? {
//!         Resolution::Confirmed(url) | Resolution::BestEffort(url) => println!("{url}"),
//!         Resolution::Pending => println!("try again shortly"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod resolver;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;

// Re-export main types at crate root
pub use cache::{CacheStore, CacheValue, Confidence, FanartRecord, SharedCache};
pub use error::{FanartError, Result};
pub use fetch::{FetchCoordinator, HttpClient, ReqwestClient, UpstreamResponse};
pub use resolver::{FanartQuery, Resolution, Resolver, ResolverConfig};

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
