//! Show → artwork resolution.
//!
//! [`Resolver::resolve`] walks an ordered chain of lookups, each more
//! expensive and less certain than the last:
//!
//! ```text
//! fanart/<id> cached? ──yes──────────────────────────────► record
//!        │ no
//!        ▼
//! bootstrap loaded? ──no──► fetch dataset ──failed──────► Pending
//!        │ yes                   │ id present ──────────► Confirmed
//!        ▼                       ▼ id absent
//! episode listing ──► show slug ──► show page marquee ──► Confirmed
//!        │                               │ nothing usable
//!        ▼                               ▼
//!   first episode image ────────────────────────────────► BestEffort
//!        │ none
//!        ▼
//!     NotFound (nothing cached)
//! ```
//!
//! Upstream and parse failures at any stage fall through to the next one.
//! Every upstream call goes through the [`FetchCoordinator`], so concurrent
//! resolutions for the same show share fetches.

pub mod scrape;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, instrument, warn};

use crate::cache::{
    BOOTSTRAP_LOADED_KEY, CacheValue, Confidence, FanartRecord, SharedCache, fanart_key,
};
use crate::fetch::FetchCoordinator;
use crate::telemetry;
use crate::{FanartError, Result};

use scrape::EpisodeListing;

/// Default location of the bootstrap dataset.
pub const DEFAULT_BOOTSTRAP_URL: &str =
    "https://gist.githubusercontent.com/adammw/8662672/raw/fanart.json";

/// Default episode listing endpoint; `{id}` is replaced by the show id.
pub const DEFAULT_EPISODES_URL: &str = "http://tenplay.com.au/Handlers/GenericUserControlRenderer.ashx?path=~/UserControls/Browse/Episodes.ascx&props=ParentID,{{id}}";

/// Default site hosting show pages at `/<channel>/<show>`.
pub const DEFAULT_SITE_URL: &str = "http://tenplay.com.au";

/// Images served from here are generic placeholders, not show artwork.
pub const DEFAULT_PLACEHOLDER_IMAGE_PREFIX: &str = "http://iprx.ten.com.au/ImageHandler.ashx";

pub const DEFAULT_USER_AGENT: &str = "fanart-fetcher/0.0.1";

/// Show pages are only served to browser-looking clients.
pub const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 fanart-fetcher/0.0.1";

/// Upstream locations and request identity used by the [`Resolver`].
///
/// ```rust
/// # use fanart::resolver::ResolverConfig;
/// let config = ResolverConfig::new()
///     .bootstrap_url("http://localhost:9000/fanart.json")
///     .site_url("http://localhost:9000");
/// assert!(config.episodes_url.contains("{id}"));
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// JSON object of show id → image URL.
    pub bootstrap_url: String,
    /// Episode listing URL template containing `{id}`.
    pub episodes_url: String,
    /// Base URL of show pages.
    pub site_url: String,
    /// Marquee images starting with this prefix are ignored.
    pub placeholder_image_prefix: String,
    /// User-Agent for the bootstrap and episode listing requests.
    pub user_agent: String,
    /// User-Agent for show page requests.
    pub browser_user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: DEFAULT_BOOTSTRAP_URL.to_string(),
            episodes_url: DEFAULT_EPISODES_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            placeholder_image_prefix: DEFAULT_PLACEHOLDER_IMAGE_PREFIX.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            browser_user_agent: DEFAULT_BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bootstrap_url(mut self, url: impl Into<String>) -> Self {
        self.bootstrap_url = url.into();
        self
    }

    pub fn episodes_url(mut self, template: impl Into<String>) -> Self {
        self.episodes_url = template.into();
        self
    }

    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = url.into();
        self
    }

    pub fn placeholder_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.placeholder_image_prefix = prefix.into();
        self
    }

    /// Episode listing URL for a show.
    pub fn episodes_url_for(&self, show_id: &str) -> String {
        self.episodes_url.replace("{id}", show_id)
    }

    /// Show page URL for `/<channel>/<show>`.
    pub fn show_page_url(&self, channel: &str, show_name: &str) -> String {
        format!(
            "{}/{channel}/{show_name}",
            self.site_url.trim_end_matches('/')
        )
    }
}

/// A request to resolve artwork for one show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanartQuery {
    pub show_id: String,
    pub channel: String,
    pub title: String,
}

impl FanartQuery {
    pub fn new(
        show_id: impl Into<String>,
        channel: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            show_id: show_id.into(),
            channel: channel.into(),
            title: title.into(),
        }
    }
}

/// Successful outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Image from the bootstrap dataset or the show's own page.
    Confirmed(String),
    /// Image guessed from the episode listing.
    BestEffort(String),
    /// The bootstrap dataset could not be loaded yet; try again shortly.
    Pending,
}

impl Resolution {
    fn outcome_label(&self) -> &'static str {
        match self {
            Resolution::Confirmed(_) => "confirmed",
            Resolution::BestEffort(_) => "best_effort",
            Resolution::Pending => "pending",
        }
    }
}

impl From<FanartRecord> for Resolution {
    fn from(record: FanartRecord) -> Self {
        match record.confidence {
            Confidence::Confirmed => Resolution::Confirmed(record.url),
            Confidence::BestEffort => Resolution::BestEffort(record.url),
        }
    }
}

/// The fallback chain turning a [`FanartQuery`] into an image URL.
pub struct Resolver {
    fetcher: FetchCoordinator,
    cache: Arc<SharedCache>,
    config: ResolverConfig,
    api_headers: HeaderMap,
    browser_headers: HeaderMap,
}

impl Resolver {
    /// Create a resolver sharing the coordinator's cache.
    ///
    /// Fails if a configured User-Agent is not a valid header value.
    pub fn new(fetcher: FetchCoordinator, config: ResolverConfig) -> Result<Self> {
        let api_headers = user_agent_headers(&config.user_agent)?;
        let browser_headers = user_agent_headers(&config.browser_user_agent)?;
        Ok(Self {
            cache: Arc::clone(fetcher.cache()),
            fetcher,
            config,
            api_headers,
            browser_headers,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve artwork for a show.
    ///
    /// Returns `Err(FanartError::NotFound)` once every stage is exhausted;
    /// nothing is cached in that case so the next request retries the chain.
    #[instrument(skip(self, query), fields(show_id = %query.show_id))]
    pub async fn resolve(&self, query: &FanartQuery) -> Result<Resolution> {
        let result = self.run(query).await;
        let outcome = match &result {
            Ok(resolution) => resolution.outcome_label(),
            Err(FanartError::NotFound) => "not_found",
            Err(_) => "error",
        };
        metrics::counter!(telemetry::RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn run(&self, query: &FanartQuery) -> Result<Resolution> {
        if let Some(record) = self.cached_record(&query.show_id) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => "fanart").increment(1);
            debug!(url = %record.url, "fanart cache hit");
            return Ok(record.into());
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => "fanart").increment(1);

        if !self.cache.contains(BOOTSTRAP_LOADED_KEY) {
            match self.load_bootstrap().await {
                Ok(dataset) => {
                    if let Some(url) = dataset.get(&query.show_id) {
                        return Ok(Resolution::Confirmed(url.clone()));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "bootstrap dataset unavailable");
                    return Ok(Resolution::Pending);
                }
            }
        }

        self.scrape(query).await
    }

    fn cached_record(&self, show_id: &str) -> Option<FanartRecord> {
        match self.cache.read(&fanart_key(show_id)) {
            Some(CacheValue::Fanart(record)) => Some(record),
            _ => None,
        }
    }

    /// Fetch the bootstrap dataset and write every entry, then the sentinel.
    ///
    /// The sentinel is only written once the whole dataset is in the cache,
    /// and expires no later than the first entry written, so a fresh
    /// sentinel always vouches for a complete dataset.
    async fn load_bootstrap(&self) -> Result<HashMap<String, String>> {
        debug!(url = %self.config.bootstrap_url, "loading bootstrap dataset");
        let response = self
            .fetcher
            .get(&self.config.bootstrap_url, self.api_headers.clone())
            .await?;
        let dataset = scrape::parse_bootstrap(&response.body)?;

        let capacity = self.cache.max_entries();
        if near_capacity(dataset.len(), capacity) {
            warn!(
                entries = dataset.len(),
                capacity, "bootstrap dataset is close to cache capacity, entries may be evicted"
            );
        }

        // Entries are written after this instant, so none expires before
        // the sentinel.
        let deadline = self
            .cache
            .default_ttl()
            .and_then(|ttl| Instant::now().checked_add(ttl));
        for (show_id, url) in &dataset {
            self.cache.write(
                fanart_key(show_id),
                CacheValue::Fanart(FanartRecord::confirmed(url)),
            );
        }
        match deadline {
            Some(deadline) => self
                .cache
                .write_until(BOOTSTRAP_LOADED_KEY, CacheValue::Flag, deadline),
            None => self.cache.write(BOOTSTRAP_LOADED_KEY, CacheValue::Flag),
        }
        info!(entries = dataset.len(), "bootstrap dataset loaded");
        Ok(dataset)
    }

    /// Stages after the bootstrap dataset: episode listing, show page,
    /// episode image.
    async fn scrape(&self, query: &FanartQuery) -> Result<Resolution> {
        let channel = scrape::slugify(&query.channel);
        let title = scrape::slugify(&query.title);

        let listing = match self.episode_listing(&query.show_id, &channel).await {
            Ok(listing) => listing,
            Err(e) if e.is_fallback_trigger() => {
                warn!(error = %e, guess = %title, "episode listing unavailable, guessing show slug from title");
                EpisodeListing {
                    show_name: Some(title).filter(|t| !t.is_empty()),
                    fallback_image: None,
                }
            }
            Err(e) => return Err(e),
        };

        match (&listing.show_name, channel.is_empty()) {
            (Some(show_name), false) => match self.show_page_image(&channel, show_name).await {
                Ok(Some(url)) => {
                    return Ok(self.remember(&query.show_id, FanartRecord::confirmed(url)));
                }
                Ok(None) => debug!(%channel, %show_name, "no usable marquee image on show page"),
                Err(e) if e.is_fallback_trigger() => {
                    warn!(%channel, %show_name, error = %e, "show page unavailable");
                }
                Err(e) => return Err(e),
            },
            _ => debug!(%channel, "no show slug to look up"),
        }

        if let Some(url) = listing.fallback_image {
            info!(%url, "using fanart from episode list");
            return Ok(self.remember(&query.show_id, FanartRecord::best_effort(url)));
        }

        Err(FanartError::NotFound)
    }

    async fn episode_listing(&self, show_id: &str, channel: &str) -> Result<EpisodeListing> {
        let url = self.config.episodes_url_for(show_id);
        let response = self.fetcher.get(&url, self.api_headers.clone()).await?;
        let listing = scrape::parse_episode_list(&response.text(), channel);
        debug!(show_name = ?listing.show_name, image = ?listing.fallback_image, "parsed episode listing");
        Ok(listing)
    }

    async fn show_page_image(&self, channel: &str, show_name: &str) -> Result<Option<String>> {
        let url = self.config.show_page_url(channel, show_name);
        let response = self.fetcher.get(&url, self.browser_headers.clone()).await?;
        Ok(scrape::find_marquee_image(
            &response.text(),
            &self.config.placeholder_image_prefix,
        ))
    }

    fn remember(&self, show_id: &str, record: FanartRecord) -> Resolution {
        self.cache
            .write(fanart_key(show_id), CacheValue::Fanart(record.clone()));
        record.into()
    }
}

/// Whether `entries` records leave less than a tenth of the cache free.
fn near_capacity(entries: usize, capacity: u64) -> bool {
    let entries = entries as u64;
    entries.saturating_add(capacity / 10) >= capacity
}

fn user_agent_headers(user_agent: &str) -> Result<HeaderMap> {
    let value = HeaderValue::from_str(user_agent).map_err(|e| {
        FanartError::Configuration(format!("invalid user agent {user_agent:?}: {e}"))
    })?;
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, value);
    Ok(headers)
}
