//! Tests for the [`Resolver`] fallback chain against mocked upstreams.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fanart::cache::{BOOTSTRAP_LOADED_KEY, CacheStore, CacheValue, SharedCache};
use fanart::resolver::{DEFAULT_BROWSER_USER_AGENT, DEFAULT_USER_AGENT};
use fanart::{
    FanartError, FanartQuery, FetchCoordinator, ReqwestClient, Resolution, Resolver,
    ResolverConfig,
};

const EPISODES_99: &str = r#"
<ul class="episodes">
  <li><a href="/about">About</a></li>
  <li>
    <a href="/ten/hot-show/episode-1">Episode 1</a>
    <img src="http://cdn/ep1.jpg">
  </li>
  <li><img src="http://cdn/ep2.jpg"></li>
</ul>"#;

const SHOW_PAGE_WITH_MARQUEE: &str = r#"
<html><body>
<div class="marquee-container">
  <div class="marquee-image"><div data-src="http://iprx.ten.com.au/ImageHandler.ashx?u=blank"></div></div>
  <div class="marquee-image"><div data-src="  "></div></div>
  <div class="marquee-image"><div data-src="//img.ten/hot-show.jpg?w=1280"></div></div>
</div>
</body></html>"#;

const SHOW_PAGE_PLACEHOLDERS_ONLY: &str = r#"
<div class="marquee-container">
  <div class="marquee-image"><div data-src="http://iprx.ten.com.au/ImageHandler.ashx?u=blank"></div></div>
</div>"#;

// =============================================================================
// Helpers
// =============================================================================

fn resolver(server: &MockServer) -> (Resolver, Arc<SharedCache>) {
    let config = ResolverConfig::new()
        .bootstrap_url(format!("{}/fanart.json", server.uri()))
        .episodes_url(format!("{}/episodes?parent={{id}}", server.uri()))
        .site_url(server.uri());
    let cache = Arc::new(CacheStore::new(Some(Duration::from_secs(60))));
    let client = Arc::new(ReqwestClient::new(Duration::from_secs(5)).unwrap());
    let fetcher = FetchCoordinator::new(client, Arc::clone(&cache));
    (Resolver::new(fetcher, config).unwrap(), cache)
}

async fn mount_bootstrap(server: &MockServer, body: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/fanart.json"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_episodes(server: &MockServer, show_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/episodes"))
        .and(query_param("parent", show_id))
        .respond_with(response)
        .mount(server)
        .await;
}

fn hot_show(id: &str) -> FanartQuery {
    FanartQuery::new(id, "TEN", "Hot Show")
}

// =============================================================================
// Bootstrap dataset
// =============================================================================

#[tokio::test]
async fn bootstrap_entry_is_confirmed_then_served_from_cache() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, r#"{"42": "http://img/42.jpg"}"#, 1).await;
    Mock::given(path("/episodes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (resolver, cache) = resolver(&server);

    for _ in 0..2 {
        let resolution = resolver.resolve(&hot_show("42")).await.unwrap();
        assert_eq!(resolution, Resolution::Confirmed("http://img/42.jpg".into()));
    }
    assert!(cache.contains("fanart/42"));
    assert!(cache.contains(BOOTSTRAP_LOADED_KEY));
}

#[tokio::test]
async fn bootstrap_is_loaded_once_across_shows() {
    let server = MockServer::start().await;
    mount_bootstrap(
        &server,
        r#"{"42": "http://img/42.jpg", "7": "http://img/7.jpg", "8": null}"#,
        1,
    )
    .await;
    mount_episodes(&server, "99", ResponseTemplate::new(200).set_body_string(EPISODES_99)).await;

    let (resolver, _) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("42")).await.unwrap(),
        Resolution::Confirmed("http://img/42.jpg".into())
    );
    assert_eq!(
        resolver.resolve(&hot_show("7")).await.unwrap(),
        Resolution::Confirmed("http://img/7.jpg".into())
    );
    assert_eq!(
        resolver.resolve(&hot_show("99")).await.unwrap(),
        Resolution::BestEffort("http://cdn/ep1.jpg".into())
    );
}

#[tokio::test]
async fn bootstrap_sentinel_expires_no_later_than_dataset() {
    let server = MockServer::start().await;
    mount_bootstrap(
        &server,
        r#"{"1": "http://img/1.jpg", "2": "http://img/2.jpg", "3": "http://img/3.jpg"}"#,
        1,
    )
    .await;

    let (resolver, cache) = resolver(&server);
    resolver.resolve(&hot_show("1")).await.unwrap();

    let sentinel = cache.expires_at(BOOTSTRAP_LOADED_KEY).unwrap();
    for id in ["1", "2", "3"] {
        let entry = cache.expires_at(&format!("fanart/{id}")).unwrap();
        assert!(sentinel <= entry, "sentinel outlives fanart/{id}");
    }
}

#[tokio::test]
async fn bootstrap_failure_is_pending_until_dataset_loads() {
    let server = MockServer::start().await;
    Mock::given(path("/fanart.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_bootstrap(&server, r#"{"42": "http://img/42.jpg"}"#, 1).await;

    let (resolver, cache) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("42")).await.unwrap(),
        Resolution::Pending
    );
    assert!(!cache.contains(BOOTSTRAP_LOADED_KEY));
    assert!(!cache.contains("fanart/42"));

    assert_eq!(
        resolver.resolve(&hot_show("42")).await.unwrap(),
        Resolution::Confirmed("http://img/42.jpg".into())
    );
    assert!(cache.contains(BOOTSTRAP_LOADED_KEY));
}

#[tokio::test]
async fn malformed_bootstrap_is_pending() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "<html>not json</html>", 1).await;

    let (resolver, cache) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("42")).await.unwrap(),
        Resolution::Pending
    );
    assert!(!cache.contains(BOOTSTRAP_LOADED_KEY));
}

#[tokio::test]
async fn concurrent_resolutions_share_one_bootstrap_fetch() {
    let server = MockServer::start().await;
    Mock::given(path("/fanart.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"42": "http://img/42.jpg"}"#)
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);
    let query = hot_show("42");

    let results =
        futures_util::future::join_all((0..8).map(|_| resolver.resolve(&query))).await;

    for result in results {
        assert_eq!(
            result.unwrap(),
            Resolution::Confirmed("http://img/42.jpg".into())
        );
    }
}

// =============================================================================
// Scraping
// =============================================================================

#[tokio::test]
async fn episode_image_is_best_effort_when_show_page_has_no_marquee() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, r#"{"42": "http://img/42.jpg"}"#, 1).await;
    mount_episodes(&server, "99", ResponseTemplate::new(200).set_body_string(EPISODES_99)).await;
    Mock::given(path("/ten/hot-show"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (resolver, cache) = resolver(&server);

    let resolution = resolver.resolve(&hot_show("99")).await.unwrap();
    assert_eq!(resolution, Resolution::BestEffort("http://cdn/ep1.jpg".into()));

    match cache.read("fanart/99") {
        Some(CacheValue::Fanart(record)) => assert_eq!(record.url, "http://cdn/ep1.jpg"),
        other => panic!("expected cached record, got {other:?}"),
    }

    // Cached best-effort record keeps its confidence.
    assert_eq!(
        resolver.resolve(&hot_show("99")).await.unwrap(),
        Resolution::BestEffort("http://cdn/ep1.jpg".into())
    );
}

#[tokio::test]
async fn show_page_marquee_is_confirmed() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "{}", 1).await;
    mount_episodes(&server, "99", ResponseTemplate::new(200).set_body_string(EPISODES_99)).await;
    Mock::given(method("GET"))
        .and(path("/ten/hot-show"))
        .and(header("user-agent", DEFAULT_BROWSER_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHOW_PAGE_WITH_MARQUEE))
        .expect(1)
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);

    for _ in 0..2 {
        assert_eq!(
            resolver.resolve(&hot_show("99")).await.unwrap(),
            Resolution::Confirmed("http://img.ten/hot-show.jpg".into())
        );
    }
}

#[tokio::test]
async fn placeholder_marquee_falls_back_to_episode_image() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "{}", 1).await;
    mount_episodes(&server, "99", ResponseTemplate::new(200).set_body_string(EPISODES_99)).await;
    Mock::given(path("/ten/hot-show"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHOW_PAGE_PLACEHOLDERS_ONLY))
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("99")).await.unwrap(),
        Resolution::BestEffort("http://cdn/ep1.jpg".into())
    );
}

#[tokio::test]
async fn listing_without_show_link_skips_show_page() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "{}", 1).await;
    mount_episodes(
        &server,
        "99",
        ResponseTemplate::new(200).set_body_string(r#"<img src="//cdn/only.jpg">"#),
    )
    .await;
    Mock::given(path_regex("^/ten/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("99")).await.unwrap(),
        Resolution::BestEffort("http://cdn/only.jpg".into())
    );
}

#[tokio::test]
async fn failed_listing_guesses_show_page_from_title() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "{}", 1).await;
    mount_episodes(&server, "99", ResponseTemplate::new(500)).await;
    Mock::given(path("/ten/hot-show"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHOW_PAGE_WITH_MARQUEE))
        .expect(1)
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);

    assert_eq!(
        resolver.resolve(&hot_show("99")).await.unwrap(),
        Resolution::Confirmed("http://img.ten/hot-show.jpg".into())
    );
}

#[tokio::test]
async fn unresolvable_show_is_not_found_and_retried() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, r#"{"42": "http://img/42.jpg"}"#, 1).await;
    Mock::given(path("/episodes"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/ten/hot-show"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let (resolver, cache) = resolver(&server);

    for _ in 0..2 {
        let err = resolver.resolve(&hot_show("99")).await.unwrap_err();
        assert!(matches!(err, FanartError::NotFound));
        assert!(!cache.contains("fanart/99"));
    }
}

#[tokio::test]
async fn empty_channel_skips_show_page() {
    let server = MockServer::start().await;
    mount_bootstrap(&server, "{}", 1).await;
    mount_episodes(&server, "99", ResponseTemplate::new(200).set_body_string(EPISODES_99)).await;
    Mock::given(path_regex("^/.+/hot-show$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (resolver, _) = resolver(&server);

    assert_eq!(
        resolver
            .resolve(&FanartQuery::new("99", "", "Hot Show"))
            .await
            .unwrap(),
        Resolution::BestEffort("http://cdn/ep1.jpg".into())
    );
}
