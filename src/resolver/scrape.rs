//! Extraction from upstream documents.
//!
//! Everything here is synchronous and returns owned data: parsed HTML
//! documents are not `Send`, so they never live across an `.await` in the
//! resolver.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::warn;

use crate::Result;

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));
static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("static selector"));
static MARQUEE_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.marquee-container div.marquee-image").expect("static selector")
});
static DATA_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-src]").expect("static selector"));

/// What the episode listing tells us about a show.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EpisodeListing {
    /// Canonical show slug taken from the first matching episode link.
    pub show_name: Option<String>,
    /// First episode thumbnail, usable as a best-effort fallback.
    pub fallback_image: Option<String>,
}

/// Parse the bootstrap dataset: a JSON object of show id → image URL.
///
/// Entries whose value is not a string are skipped.
pub fn parse_bootstrap(body: &[u8]) -> Result<HashMap<String, String>> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_slice(body)?;
    let mut dataset = HashMap::with_capacity(raw.len());
    for (id, value) in raw {
        match value {
            serde_json::Value::String(url) => {
                dataset.insert(id, url);
            }
            other => warn!(show_id = %id, value = %other, "skipping non-string bootstrap entry"),
        }
    }
    Ok(dataset)
}

/// Turn free text into a URL path slug.
///
/// Lowercases, replaces spaces with hyphens and drops everything outside
/// `[A-Za-z0-9-]`.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Scan an episode listing for the show slug and a fallback image.
///
/// The show slug is the second path segment of the first `href` starting
/// with `/<channel>`.
pub fn parse_episode_list(html: &str, channel: &str) -> EpisodeListing {
    let document = Html::parse_document(html);
    let prefix = format!("/{channel}");

    let show_name = document
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.starts_with(&prefix))
        .and_then(|href| href.split('/').nth(2))
        .filter(|segment| !segment.is_empty())
        .map(str::to_string);

    let fallback_image = document
        .select(&IMAGES)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty())
        .map(normalize_image_url);

    EpisodeListing {
        show_name,
        fallback_image,
    }
}

/// Find the show's marquee artwork on its page.
///
/// Takes the first `data-src` inside the marquee container that is neither
/// empty nor served from `placeholder_prefix`. Query strings are dropped.
pub fn find_marquee_image(html: &str, placeholder_prefix: &str) -> Option<String> {
    let document = Html::parse_document(html);

    document
        .select(&MARQUEE_IMAGES)
        .filter_map(|image| image.select(&DATA_SRC).next())
        .filter_map(|div| div.value().attr("data-src"))
        .map(normalize_image_url)
        .find(|url| !url.is_empty() && !is_placeholder(url, placeholder_prefix))
        .map(|url| match url.split_once('?') {
            Some((base, _)) => base.to_string(),
            None => url,
        })
}

fn is_placeholder(url: &str, prefix: &str) -> bool {
    !prefix.is_empty() && url.starts_with(prefix)
}

/// Make protocol-relative URLs (`//host/path`) absolute.
fn normalize_image_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("//") {
        format!("http:{url}")
    } else {
        url.to_string()
    }
}
