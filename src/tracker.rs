use std::{
    fmt,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{
    classify::classify,
    config::TrackerConfig,
    env::{Clock, CookieJar, FieldSink, Page, VerdictCache},
    fields::{FieldSynchronizer, SyncSchedule, run_schedule},
    license::{HttpValidationTransport, LicenseGate, LicenseState, ValidationTransport},
    query::PageQuery,
    storage::CookieStore,
};

/// The eight tracking value types.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TrackingKind {
    Source,
    Medium,
    Campaign,
    Referrer,
    Gclid,
    Fbclid,
    Msclkid,
    Ttclid,
}

impl TrackingKind {
    pub const ALL: [TrackingKind; 8] = [
        TrackingKind::Source,
        TrackingKind::Medium,
        TrackingKind::Campaign,
        TrackingKind::Referrer,
        TrackingKind::Gclid,
        TrackingKind::Fbclid,
        TrackingKind::Msclkid,
        TrackingKind::Ttclid,
    ];

    /// Cookie name suffix and form-field target stem.
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingKind::Source => "source",
            TrackingKind::Medium => "medium",
            TrackingKind::Campaign => "campaign",
            TrackingKind::Referrer => "referrer",
            TrackingKind::Gclid => "gclid",
            TrackingKind::Fbclid => "fbclid",
            TrackingKind::Msclkid => "msclkid",
            TrackingKind::Ttclid => "ttclid",
        }
    }

    /// URL parameter names that resolve to this value, first non-empty wins.
    /// The alias lists, including the tolerated `urm_medium` misspelling, are
    /// inherited business rules kept verbatim.
    pub fn url_params(self) -> &'static [&'static str] {
        match self {
            TrackingKind::Source => &["utm_source"],
            TrackingKind::Medium => &["utm_medium", "urm_medium"],
            TrackingKind::Campaign => &["utm_campaign"],
            TrackingKind::Referrer => &[],
            TrackingKind::Gclid => &["gclid", "wbraid", "gbraid", "dclid"],
            TrackingKind::Fbclid => &["fbclid", "fb_click_id", "fbadid"],
            TrackingKind::Msclkid => &["msclkid", "msclid"],
            TrackingKind::Ttclid => &["ttclid", "ttclid_ss", "clickid"],
        }
    }

    fn default_value(self) -> &'static str {
        match self {
            TrackingKind::Source => "direct",
            TrackingKind::Medium | TrackingKind::Campaign => "none",
            _ => "",
        }
    }
}

impl fmt::Display for TrackingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host-environment capabilities a tracker runs against.
#[derive(Clone)]
pub struct TrackerEnv {
    pub page: Arc<dyn Page>,
    pub cookies: Arc<Mutex<dyn CookieJar>>,
    pub cache: Arc<Mutex<dyn VerdictCache>>,
    pub fields: Arc<Mutex<dyn FieldSink>>,
    pub clock: Arc<dyn Clock>,
}

/// Resolves one tracking value: current URL parameter (with aliases), then
/// persisted cookie, then hardcoded default.
#[derive(Clone)]
pub(crate) struct ValueResolver {
    page: Arc<dyn Page>,
    store: CookieStore,
    cookie_prefix: String,
}

impl ValueResolver {
    pub(crate) fn new(page: Arc<dyn Page>, store: CookieStore, cookie_prefix: String) -> Self {
        Self {
            page,
            store,
            cookie_prefix,
        }
    }

    pub(crate) fn resolve(&self, kind: TrackingKind) -> String {
        let query = PageQuery::from_page_url(&self.page.url());
        if let Some(value) = query.first_of(kind.url_params()) {
            return value.to_owned();
        }

        let cookie = self.store.read(&format!("{}{kind}", self.cookie_prefix));
        if !cookie.is_empty() {
            return cookie;
        }

        kind.default_value().to_owned()
    }
}

/// Snapshot of all eight tracking values.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub referrer: String,
    pub gclid: String,
    pub fbclid: String,
    pub msclkid: String,
    pub ttclid: String,
}

/// Session tracker: runs the license gate, persists the visit's attribution,
/// and keeps form fields in sync.
///
/// One instance per page load; all state is instance-scoped, so independent
/// trackers never contaminate each other.
pub struct Tracker {
    config: TrackerConfig,
    env: TrackerEnv,
    store: CookieStore,
    resolver: ValueResolver,
    license: LicenseGate,
    sync_task: Option<JoinHandle<()>>,
}

impl Tracker {
    /// Tracker with the reqwest-backed license transport.
    pub fn new(config: TrackerConfig, env: TrackerEnv) -> Self {
        Self::with_transport(config, env, Arc::new(HttpValidationTransport::new()))
    }

    /// Tracker with a custom license transport.
    pub fn with_transport(
        config: TrackerConfig,
        env: TrackerEnv,
        transport: Arc<dyn ValidationTransport>,
    ) -> Self {
        let store = CookieStore::new(env.cookies.clone(), env.clock.clone());
        let resolver = ValueResolver::new(
            env.page.clone(),
            store.clone(),
            config.cookie_prefix.clone(),
        );
        let license = LicenseGate::new(env.cache.clone(), env.clock.clone(), transport);

        Self {
            config,
            env,
            store,
            resolver,
            license,
            sync_task: None,
        }
    }

    /// Current license gate state.
    pub fn license_state(&self) -> LicenseState {
        self.license.state()
    }

    /// Run the license gate, persist this visit's attribution, and start the
    /// periodic field synchronizer. Never fails toward the host page: an
    /// invalid license disables tracking and is only logged.
    pub async fn init(&mut self) {
        debug!("Initializing referrer tracker");

        if self.config.validate_on_init && self.license.state() == LicenseState::Unchecked {
            let verdict = self
                .license
                .validate(&self.config, self.env.page.as_ref())
                .await;

            if !verdict.valid {
                error!("Tracking disabled: invalid or missing license");
                return;
            }

            debug!("License validated, tracking enabled");
        }

        self.apply_tracking();

        if self.config.auto_fill_fields {
            self.start_field_sync();
        }
    }

    /// The persistence step: derive this visit's values and write them to the
    /// cookie jar under the record-freshness rules.
    fn apply_tracking(&self) {
        let referrer = self.env.page.referrer();
        let query = PageQuery::from_page_url(&self.env.page.url());

        let mut source = query.get_non_empty("utm_source").map(str::to_owned);
        let mut medium = query
            .get_non_empty("utm_medium")
            .or_else(|| query.get_non_empty("urm_medium"))
            .map(str::to_owned);
        let mut campaign = query.get_non_empty("utm_campaign").map(str::to_owned);

        let click_ids = [
            TrackingKind::Gclid,
            TrackingKind::Fbclid,
            TrackingKind::Msclkid,
            TrackingKind::Ttclid,
        ]
        .map(|kind| (kind, query.first_of(kind.url_params()).map(str::to_owned)));

        if source.is_none() || medium.is_none() {
            let parsed = classify(&referrer, &query, &self.env.page.hostname());
            if source.is_none() {
                source = Some(parsed.source);
            }
            if medium.is_none() {
                medium = Some(parsed.medium);
            }
            if campaign.is_none() && !parsed.campaign.is_empty() {
                campaign = Some(parsed.campaign);
            }
        }

        let source = source.unwrap_or_else(|| "direct".to_owned());
        let medium = medium.unwrap_or_else(|| "none".to_owned());
        let campaign = campaign.unwrap_or_else(|| "none".to_owned());

        if self.config.debug {
            debug!(source, medium, campaign, referrer, "Final tracking values");
        }

        let prefix = &self.config.cookie_prefix;
        let days = self.config.cookie_expire_days;
        let path = &self.config.cookie_path;

        // Fresh UTM parameters re-create the attribution record as one unit;
        // otherwise an existing record is left alone. Only the three `utm_*`
        // names count as fresh, not the `urm_medium` misspelling.
        let has_utm = query.get_non_empty("utm_source").is_some()
            || query.get_non_empty("utm_medium").is_some()
            || query.get_non_empty("utm_campaign").is_some();
        let existing_source = self.store.read(&format!("{prefix}source"));

        if has_utm || existing_source.is_empty() {
            for name in ["source", "medium", "campaign"] {
                self.store.delete(&format!("{prefix}{name}"), path);
            }
            self.store.write(&format!("{prefix}source"), &source, days, path);
            self.store.write(&format!("{prefix}medium"), &medium, days, path);
            self.store
                .write(&format!("{prefix}campaign"), &campaign, days, path);
            debug!("Attribution cookies updated");
        }

        // The referrer is persisted once and never overwritten.
        if !referrer.is_empty() && self.store.read(&format!("{prefix}referrer")).is_empty() {
            self.store
                .write(&format!("{prefix}referrer"), &referrer, days, path);
        }

        // Click identifiers overwrite independently whenever present.
        for (kind, value) in click_ids {
            if let Some(value) = value {
                self.store.write(&format!("{prefix}{kind}"), &value, days, path);
                if self.config.debug {
                    debug!(%kind, value, "Click identifier cookie set");
                }
            }
        }
    }

    /// Resolved value for `kind`: URL parameter, then cookie, then default.
    pub fn tracking_value(&self, kind: TrackingKind) -> String {
        self.resolver.resolve(kind)
    }

    /// The license-gated read path: with `validate_on_init` set and no valid
    /// license resolved, `source` reads as empty.
    pub fn source(&self) -> String {
        if self.config.validate_on_init && !self.license.is_valid() {
            warn!("License not validated, source withheld");
            return String::new();
        }

        self.resolver.resolve(TrackingKind::Source)
    }

    pub fn medium(&self) -> String {
        self.resolver.resolve(TrackingKind::Medium)
    }

    pub fn campaign(&self) -> String {
        self.resolver.resolve(TrackingKind::Campaign)
    }

    pub fn referrer(&self) -> String {
        self.resolver.resolve(TrackingKind::Referrer)
    }

    pub fn gclid(&self) -> String {
        self.resolver.resolve(TrackingKind::Gclid)
    }

    pub fn fbclid(&self) -> String {
        self.resolver.resolve(TrackingKind::Fbclid)
    }

    pub fn msclkid(&self) -> String {
        self.resolver.resolve(TrackingKind::Msclkid)
    }

    pub fn ttclid(&self) -> String {
        self.resolver.resolve(TrackingKind::Ttclid)
    }

    /// All eight values at once; `source` passes through the license gate.
    pub fn all(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            source: self.source(),
            medium: self.medium(),
            campaign: self.campaign(),
            referrer: self.referrer(),
            gclid: self.gclid(),
            fbclid: self.fbclid(),
            msclkid: self.msclkid(),
            ttclid: self.ttclid(),
        }
    }

    /// One manual field synchronization pass, independent of the schedule.
    pub fn update_fields(&self) {
        self.synchronizer().sync_once();
    }

    fn synchronizer(&self) -> FieldSynchronizer {
        FieldSynchronizer::new(
            self.resolver.clone(),
            self.env.fields.clone(),
            self.config.debug,
        )
    }

    fn start_field_sync(&mut self) {
        let schedule = SyncSchedule::new(self.config.update_interval, self.config.update_duration);
        self.sync_task = Some(tokio::spawn(run_schedule(self.synchronizer(), schedule)));
    }

    /// Cancel the periodic field synchronizer for this page load.
    pub fn stop_field_sync(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop_field_sync();
    }
}
