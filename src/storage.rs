use std::sync::{Arc, Mutex};

use chrono::TimeDelta;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tracing::debug;

use crate::env::{Clock, CookieJar};

/// Characters left verbatim by `encodeURIComponent`; everything else in a
/// cookie value is percent-encoded.
const COOKIE_VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Cookie timestamp format, the `Date.toUTCString` shape.
pub(crate) const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const DELETE_EXPIRY: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Cookie-backed key-value accessor over the raw jar capability.
///
/// Values are percent-encoded on write and decoded on read. A missing cookie
/// reads as the empty string; no error surfaces from any of these calls.
#[derive(Clone)]
pub(crate) struct CookieStore {
    jar: Arc<Mutex<dyn CookieJar>>,
    clock: Arc<dyn Clock>,
}

impl CookieStore {
    pub(crate) fn new(jar: Arc<Mutex<dyn CookieJar>>, clock: Arc<dyn Clock>) -> Self {
        Self { jar, clock }
    }

    pub(crate) fn read(&self, name: &str) -> String {
        let header = self.jar.lock().unwrap().cookie_header();
        let prefix = format!("{name}=");

        for part in header.split(';') {
            if let Some(value) = part.trim_start().strip_prefix(&prefix) {
                return percent_decode_str(value).decode_utf8_lossy().into_owned();
            }
        }

        String::new()
    }

    pub(crate) fn write(&self, name: &str, value: &str, days: i64, path: &str) {
        let expires = self.clock.now() + TimeDelta::days(days);
        let cookie = format!(
            "{name}={};expires={};path={path};SameSite=Lax",
            utf8_percent_encode(value, COOKIE_VALUE_SET),
            expires.format(COOKIE_DATE_FORMAT),
        );

        debug!(name, "Writing cookie");
        self.jar.lock().unwrap().set_cookie(&cookie);
    }

    pub(crate) fn delete(&self, name: &str, path: &str) {
        self.jar
            .lock()
            .unwrap()
            .set_cookie(&format!("{name}=;expires={DELETE_EXPIRY};path={path}"));
    }
}
