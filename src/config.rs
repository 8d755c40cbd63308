use std::time::Duration;

use url::Url;

pub(crate) const DEFAULT_LICENSE_ENDPOINT: &str = "https://api.referrertracker.com/v1/validate";

/// Tracker configuration. Set once at construction, read-only afterwards;
/// every field has a working default except `api_key`, which must be supplied
/// for license validation to succeed.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// API key presented to the license server.
    pub api_key: String,
    /// License validation endpoint.
    pub license_endpoint: Url,
    /// Validate the license during `init`. When unset, tracking runs ungated.
    pub validate_on_init: bool,
    /// Cache successful verdicts in the verdict cache.
    pub cache_validation: bool,
    /// Lifetime of a cached verdict.
    pub cache_duration: Duration,
    /// Prefix applied to every tracking cookie name.
    pub cookie_prefix: String,
    /// Tracking cookie retention in days.
    pub cookie_expire_days: i64,
    /// Cookie path scope.
    pub cookie_path: String,
    /// Emit per-cookie and per-field debug events.
    pub debug: bool,
    /// Spawn the periodic form-field synchronizer during `init`.
    pub auto_fill_fields: bool,
    /// Delay between field synchronization passes.
    pub update_interval: Duration,
    /// How long the synchronizer keeps running after `init`.
    pub update_duration: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            license_endpoint: Url::parse(DEFAULT_LICENSE_ENDPOINT)
                .expect("default endpoint is a valid URL"),
            validate_on_init: true,
            cache_validation: true,
            cache_duration: Duration::from_secs(24 * 60 * 60),
            cookie_prefix: "rt_".to_owned(),
            cookie_expire_days: 30,
            cookie_path: "/".to_owned(),
            debug: false,
            auto_fill_fields: true,
            update_interval: Duration::from_millis(500),
            update_duration: Duration::from_secs(10),
        }
    }
}
