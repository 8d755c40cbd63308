//! Traffic-attribution tracker for lead-generation pages.
//!
//! Classifies a visit into a (source, medium, campaign) taxonomy from the
//! page URL and referrer, persists the classification and any ad click
//! identifiers in cookie-style storage, and mirrors the values into form
//! fields so they submit with leads. Tracking is gated behind a remote
//! license check keyed by an API key.
//!
//! The host environment (page, cookie jar, verdict cache, form fields,
//! clock) is reached only through the capability traits in [`env`], so the
//! crate runs against a browser bridge, a server-side renderer, or the
//! bundled in-memory implementations alike.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//!
//! use referrer_tracker::{
//!     env::{MemoryCookieJar, MemoryFieldSink, MemoryPage, MemoryVerdictCache, SystemClock},
//!     Tracker, TrackerConfig, TrackerEnv,
//! };
//!
//! # async fn run() {
//! let clock = Arc::new(SystemClock);
//! let env = TrackerEnv {
//!     page: Arc::new(
//!         MemoryPage::at("https://shop.example.com/?utm_source=newsletter&utm_medium=email"),
//!     ),
//!     cookies: Arc::new(Mutex::new(MemoryCookieJar::new(clock.clone()))),
//!     cache: Arc::new(Mutex::new(MemoryVerdictCache::default())),
//!     fields: Arc::new(Mutex::new(MemoryFieldSink::default())),
//!     clock,
//! };
//!
//! let config = TrackerConfig {
//!     api_key: "your-api-key".to_owned(),
//!     ..TrackerConfig::default()
//! };
//!
//! let mut tracker = Tracker::new(config, env);
//! tracker.init().await;
//! assert_eq!(tracker.medium(), "email");
//! # }
//! ```

mod classify;
mod config;
pub mod env;
mod fields;
mod license;
mod query;
mod storage;
mod tracker;

pub use classify::{Attribution, classify};
pub use config::TrackerConfig;
pub use license::{
    HttpValidationTransport, LicenseState, LicenseVerdict, ValidationRequest, ValidationResponse,
    ValidationTransport,
};
pub use query::PageQuery;
pub use tracker::{Tracker, TrackerEnv, TrackingKind, TrackingSnapshot};
