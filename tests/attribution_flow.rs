//! End-to-end attribution scenarios over the in-memory environment.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use referrer_tracker::{
    Tracker, TrackerConfig, TrackerEnv,
    env::{
        CookieJar as _, ManualClock, MemoryCookieJar, MemoryFieldSink, MemoryPage,
        MemoryVerdictCache,
    },
};

struct Site {
    clock: ManualClock,
    cookies: Arc<Mutex<MemoryCookieJar>>,
    cache: Arc<Mutex<MemoryVerdictCache>>,
    fields: Arc<Mutex<MemoryFieldSink>>,
}

impl Site {
    fn new() -> Self {
        let clock = ManualClock::at(Utc::now());
        Self {
            cookies: Arc::new(Mutex::new(MemoryCookieJar::new(Arc::new(clock.clone())))),
            cache: Arc::new(Mutex::new(MemoryVerdictCache::default())),
            fields: Arc::new(Mutex::new(MemoryFieldSink::default())),
            clock,
        }
    }

    /// Tracker for one page load, sharing the site's jar and cache. License
    /// validation and auto field sync are off; these tests cover persistence
    /// and resolution.
    fn visit(&self, page: MemoryPage) -> Tracker {
        let env = TrackerEnv {
            page: Arc::new(page),
            cookies: self.cookies.clone(),
            cache: self.cache.clone(),
            fields: self.fields.clone(),
            clock: Arc::new(self.clock.clone()),
        };

        let config = TrackerConfig {
            validate_on_init: false,
            auto_fill_fields: false,
            ..TrackerConfig::default()
        };

        Tracker::new(config, env)
    }

    fn cookie_header(&self) -> String {
        self.cookies.lock().unwrap().cookie_header()
    }
}

#[tokio::test]
async fn utm_parameters_persist_and_resolve() {
    let site = Site::new();
    let mut tracker = site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email",
    ));
    tracker.init().await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=newsletter"));
    assert!(header.contains("rt_medium=email"));
    assert!(header.contains("rt_campaign=none"));

    assert_eq!(tracker.source(), "newsletter");
    assert_eq!(tracker.medium(), "email");
    assert_eq!(tracker.campaign(), "none");
}

#[tokio::test]
async fn google_search_referrer_classifies_as_organic() {
    let site = Site::new();
    let mut tracker = site.visit(
        MemoryPage::at("https://shop.example.com/")
            .with_referrer("https://www.google.com/search?q=x"),
    );
    tracker.init().await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=google"));
    assert!(header.contains("rt_medium=organic"));
    assert_eq!(tracker.medium(), "organic");
    assert_eq!(
        tracker.referrer(),
        "https://www.google.com/search?q=x",
        "original referrer is persisted verbatim"
    );
}

#[tokio::test]
async fn gclid_with_empty_referrer_is_paid_google() {
    let site = Site::new();
    let mut tracker = site.visit(MemoryPage::at("https://shop.example.com/?gclid=abc123"));
    tracker.init().await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=google"));
    assert!(header.contains("rt_medium=cpc"));
    assert!(header.contains("rt_gclid=abc123"));
    assert_eq!(tracker.gclid(), "abc123");
}

#[tokio::test]
async fn later_visit_without_utm_keeps_the_record() {
    let site = Site::new();
    site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email",
    ))
    .init()
    .await;

    // Second page load arrives from Bing with no campaign tags.
    site.visit(
        MemoryPage::at("https://shop.example.com/pricing")
            .with_referrer("https://www.bing.com/search?q=y"),
    )
    .init()
    .await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=newsletter"));
    assert!(header.contains("rt_medium=email"));
    assert!(!header.contains("rt_source=bing"));
}

#[tokio::test]
async fn fresh_utm_parameters_replace_the_record() {
    let site = Site::new();
    site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email",
    ))
    .init()
    .await;

    site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=spring-sale&utm_medium=cpc",
    ))
    .init()
    .await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=spring-sale"));
    assert!(header.contains("rt_medium=cpc"));
    assert!(!header.contains("newsletter"));
}

#[tokio::test]
async fn click_identifiers_overwrite_even_when_the_record_is_kept() {
    let site = Site::new();
    site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email&gclid=first",
    ))
    .init()
    .await;

    site.visit(MemoryPage::at("https://shop.example.com/?gclid=second"))
        .init()
        .await;

    let header = site.cookie_header();
    assert!(header.contains("rt_source=newsletter"), "record kept");
    assert!(header.contains("rt_gclid=second"), "click id overwritten");
}

#[tokio::test]
async fn referrer_cookie_is_write_once() {
    let site = Site::new();
    site.visit(
        MemoryPage::at("https://shop.example.com/?utm_source=x&utm_medium=y")
            .with_referrer("https://blog.partner.io/post"),
    )
    .init()
    .await;

    site.visit(
        MemoryPage::at("https://shop.example.com/?utm_source=z&utm_medium=w")
            .with_referrer("https://www.google.com/"),
    )
    .init()
    .await;

    let header = site.cookie_header();
    assert!(header.contains("rt_referrer=https%3A%2F%2Fblog.partner.io%2Fpost"));
}

#[tokio::test]
async fn defaults_apply_with_no_parameters_and_no_cookies() {
    let site = Site::new();
    let tracker = site.visit(MemoryPage::at("https://shop.example.com/"));
    // No init: nothing persisted, resolution falls through to defaults.

    assert_eq!(tracker.source(), "direct");
    assert_eq!(tracker.medium(), "none");
    assert_eq!(tracker.campaign(), "none");
    assert_eq!(tracker.gclid(), "");
    assert_eq!(tracker.referrer(), "");
}

#[tokio::test]
async fn url_aliases_resolve_without_touching_the_record() {
    let site = Site::new();
    site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email",
    ))
    .init()
    .await;

    // The urm_medium misspelling resolves for reads but does not count as a
    // fresh UTM parameter, so the persisted record stays intact.
    let mut tracker = site.visit(MemoryPage::at("https://shop.example.com/?urm_medium=promo"));
    tracker.init().await;

    assert_eq!(tracker.medium(), "promo");
    assert!(site.cookie_header().contains("rt_medium=email"));
}

#[tokio::test]
async fn snapshot_reports_all_eight_values() {
    let site = Site::new();
    let mut tracker = site.visit(MemoryPage::at(
        "https://shop.example.com/?utm_source=ads&utm_medium=cpc&utm_campaign=spring&fbclid=fb1",
    ));
    tracker.init().await;

    let all = tracker.all();
    assert_eq!(all.source, "ads");
    assert_eq!(all.medium, "cpc");
    assert_eq!(all.campaign, "spring");
    assert_eq!(all.fbclid, "fb1");
    assert_eq!(all.gclid, "");
    assert_eq!(all.msclkid, "");
    assert_eq!(all.ttclid, "");
}
