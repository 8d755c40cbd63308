//! Capability traits for the host environment.
//!
//! Everything the tracker touches in its host (the page URL and referrer, the
//! cookie jar, the verdict cache, form fields, the wall clock) goes through
//! one of these narrow interfaces, so the classification and persistence
//! logic runs and tests without a real browser. In-memory implementations of
//! every capability live in [`memory`].

mod memory;

pub use memory::{
    ManualClock, MemoryCookieJar, MemoryField, MemoryFieldSink, MemoryPage, MemoryVerdictCache,
};

use chrono::{DateTime, Utc};

/// Read-only view of the hosting page.
pub trait Page: Send + Sync {
    /// Full URL of the current page.
    fn url(&self) -> String;

    /// Hostname of the current page.
    fn hostname(&self) -> String;

    /// Referrer URL as reported by the host; empty when there is none.
    fn referrer(&self) -> String;

    /// User-agent string of the host.
    fn user_agent(&self) -> String;
}

/// Raw cookie jar, the `document.cookie` surface of a browser.
pub trait CookieJar: Send {
    /// Semicolon-separated `name=value` pairs currently visible to the page.
    fn cookie_header(&self) -> String;

    /// Accept one cookie string: `name=value` followed by attributes such as
    /// `expires`, `path`, and `SameSite`. An `expires` stamp in the past
    /// removes the cookie.
    fn set_cookie(&mut self, cookie: &str);
}

/// Small string store for the cached license verdict (the `localStorage`
/// surface of a browser).
pub trait VerdictCache: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// Addresses form fields the three ways the tracker targets them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldSelector {
    /// Every element carrying the class.
    Class(String),
    /// The element with the id.
    Id(String),
    /// Every element with the `name` attribute.
    Name(String),
}

/// Form-field write surface.
pub trait FieldSink: Send {
    /// Write `value` into every field matched by `selector` whose current
    /// value differs, and return how many fields changed. Fields that already
    /// hold `value` must be left untouched.
    fn fill(&mut self, selector: &FieldSelector, value: &str) -> usize;
}

/// Wall clock, injectable so expiry logic is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
