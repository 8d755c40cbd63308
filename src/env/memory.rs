//! In-memory capability implementations, used by headless hosts and tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use url::Url;

use super::{Clock, CookieJar, FieldSelector, FieldSink, Page, VerdictCache};
use crate::storage::COOKIE_DATE_FORMAT;

/// Fixed page view.
#[derive(Clone, Debug, Default)]
pub struct MemoryPage {
    pub url: String,
    pub hostname: String,
    pub referrer: String,
    pub user_agent: String,
}

impl MemoryPage {
    /// Page view for `url`, with the hostname derived from it.
    pub fn at(url: &str) -> Self {
        let hostname = Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .unwrap_or_default();

        Self {
            url: url.to_owned(),
            hostname,
            referrer: String::new(),
            user_agent: "referrer-tracker-headless".to_owned(),
        }
    }

    pub fn with_referrer(mut self, referrer: &str) -> Self {
        self.referrer = referrer.to_owned();
        self
    }
}

impl Page for MemoryPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

/// Cookie jar that accepts cookie strings the way a browser does: one pair
/// plus attributes, insertion order preserved, a past `expires` stamp removes
/// the cookie.
pub struct MemoryCookieJar {
    clock: Arc<dyn Clock>,
    cookies: Vec<(String, String)>,
}

impl MemoryCookieJar {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cookies: Vec::new(),
        }
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&mut self, cookie: &str) {
        let mut parts = cookie.split(';');

        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim().to_owned();

        let mut expired = false;
        for attr in parts {
            if let Some(stamp) = attr.trim().strip_prefix("expires=") {
                if let Ok(expires) = NaiveDateTime::parse_from_str(stamp, COOKIE_DATE_FORMAT) {
                    expired = expires.and_utc() <= self.clock.now();
                }
            }
        }

        self.cookies.retain(|(existing, _)| *existing != name);
        if !expired {
            self.cookies.push((name, value.to_owned()));
        }
    }
}

/// Verdict cache backed by a map.
#[derive(Debug, Default)]
pub struct MemoryVerdictCache {
    entries: HashMap<String, String>,
}

impl VerdictCache for MemoryVerdictCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// One form field, addressable by any combination of id, name, and classes.
#[derive(Clone, Debug, Default)]
pub struct MemoryField {
    pub id: Option<String>,
    pub name: Option<String>,
    pub classes: Vec<String>,
    pub value: String,
}

impl MemoryField {
    pub fn with_id(id: &str) -> Self {
        Self {
            id: Some(id.to_owned()),
            ..Self::default()
        }
    }

    pub fn with_name(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }

    pub fn with_class(class: &str) -> Self {
        Self {
            classes: vec![class.to_owned()],
            ..Self::default()
        }
    }
}

/// Field sink over a flat list of [`MemoryField`]s; counts every value
/// mutation so idempotence is observable.
#[derive(Debug, Default)]
pub struct MemoryFieldSink {
    fields: Vec<MemoryField>,
    mutations: usize,
}

impl MemoryFieldSink {
    pub fn push(&mut self, field: MemoryField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[MemoryField] {
        &self.fields
    }

    /// Total number of field writes that changed a value.
    pub fn mutations(&self) -> usize {
        self.mutations
    }
}

impl FieldSink for MemoryFieldSink {
    fn fill(&mut self, selector: &FieldSelector, value: &str) -> usize {
        let mut changed = 0;

        for field in &mut self.fields {
            let matched = match selector {
                FieldSelector::Class(class) => field.classes.iter().any(|c| c == class),
                FieldSelector::Id(id) => field.id.as_deref() == Some(id),
                FieldSelector::Name(name) => field.name.as_deref() == Some(name),
            };

            if matched && field.value != value {
                field.value = value.to_owned();
                changed += 1;
            }
        }

        self.mutations += changed;
        changed
    }
}

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
