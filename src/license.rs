use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context as _, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use http::HeaderName;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, warn};
use url::Url;

use crate::{
    config::TrackerConfig,
    env::{Clock, Page, VerdictCache},
};

/// Cache key for the stored verdict.
pub(crate) const LICENSE_CACHE_KEY: &str = "rt_license_cache";

const VERSION_HEADER: HeaderName = HeaderName::from_static("x-rt-version");

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(20);

/// License gate states. `validate` moves the gate from `Unchecked` through
/// `Checking` to one of the resolved states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LicenseState {
    Unchecked,
    Checking,
    Valid,
    Invalid,
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseState::Unchecked => write!(f, "Unchecked"),
            LicenseState::Checking => write!(f, "Checking"),
            LicenseState::Valid => write!(f, "Valid"),
            LicenseState::Invalid => write!(f, "Invalid"),
        }
    }
}

/// Outcome of one validation attempt.
#[derive(Clone, Debug)]
pub struct LicenseVerdict {
    pub valid: bool,
    pub message: Option<String>,
    /// When the cached form of this verdict stops counting; `None` when the
    /// verdict was not cached.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body sent to the license server.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub api_key: String,
    pub domain: String,
    pub url: String,
    pub user_agent: String,
}

/// Response body returned by the license server.
#[derive(Clone, Debug, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Cached verdict with its expiry stamp, stored as JSON.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CachedVerdict {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
    expires_at: i64,
}

/// Transport seam for the validation call, injectable for tests.
#[async_trait]
pub trait ValidationTransport: Send + Sync {
    async fn validate(
        &self,
        endpoint: &Url,
        request: &ValidationRequest,
    ) -> anyhow::Result<ValidationResponse>;
}

/// reqwest-backed transport used outside of tests.
#[derive(Default)]
pub struct HttpValidationTransport {
    client: reqwest::Client,
}

impl HttpValidationTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValidationTransport for HttpValidationTransport {
    async fn validate(
        &self,
        endpoint: &Url,
        request: &ValidationRequest,
    ) -> anyhow::Result<ValidationResponse> {
        let response = match timeout(
            VALIDATE_TIMEOUT,
            self.client
                .post(endpoint.clone())
                .header(VERSION_HEADER, env!("CARGO_PKG_VERSION"))
                .json(request)
                .send(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(
                    anyhow!(err).context(format!("Failed to reach license server at {endpoint}"))
                );
            }
            Err(_) => {
                bail!("License validation at {endpoint} timed out ({VALIDATE_TIMEOUT:?})");
            }
        };

        let status = response.status();

        if !status.is_success() {
            match timeout(Duration::from_secs(5), response.text()).await {
                Ok(Ok(text)) => bail!("License validation at {endpoint} failed: {status}: {text}"),
                Ok(Err(err)) => bail!(
                    "License validation at {endpoint} failed: {status} <error while receiving response body>: {err:#?}"
                ),
                Err(_) => bail!(
                    "License validation at {endpoint} failed: {status} <timed out while receiving response body>"
                ),
            }
        }

        response
            .json::<ValidationResponse>()
            .await
            .context("License server returned a malformed validation response")
    }
}

/// License gate: at most one remote check per page load, verdict cached with
/// a TTL, synchronous `is_valid` view of the last resolved state.
pub(crate) struct LicenseGate {
    cache: Arc<Mutex<dyn VerdictCache>>,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn ValidationTransport>,
    state: LicenseState,
}

impl LicenseGate {
    pub(crate) fn new(
        cache: Arc<Mutex<dyn VerdictCache>>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn ValidationTransport>,
    ) -> Self {
        Self {
            cache,
            clock,
            transport,
            state: LicenseState::Unchecked,
        }
    }

    pub(crate) fn state(&self) -> LicenseState {
        self.state
    }

    /// Synchronous view of the last resolved verdict. Never triggers a check.
    pub(crate) fn is_valid(&self) -> bool {
        self.state == LicenseState::Valid
    }

    /// Unexpired, well-formed cache entry, if any. Expired and malformed
    /// entries are removed and read as a miss.
    fn cached_verdict(&self, enabled: bool) -> Option<LicenseVerdict> {
        if !enabled {
            return None;
        }

        let mut cache = self.cache.lock().unwrap();
        let raw = cache.get(LICENSE_CACHE_KEY)?;

        let parsed: CachedVerdict = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "Discarding malformed license cache entry");
                cache.remove(LICENSE_CACHE_KEY);
                return None;
            }
        };

        let Some(expires_at) = DateTime::from_timestamp_millis(parsed.expires_at) else {
            cache.remove(LICENSE_CACHE_KEY);
            return None;
        };

        if expires_at <= self.clock.now() {
            cache.remove(LICENSE_CACHE_KEY);
            return None;
        }

        debug!("Using cached license validation");
        Some(LicenseVerdict {
            valid: parsed.valid,
            message: parsed.message,
            expires_at: Some(expires_at),
        })
    }

    fn store_verdict(
        &self,
        enabled: bool,
        response: &ValidationResponse,
        ttl: Duration,
    ) -> Option<DateTime<Utc>> {
        if !enabled {
            return None;
        }

        let Ok(ttl) = TimeDelta::from_std(ttl) else {
            return None;
        };
        let expires_at = self.clock.now() + ttl;

        let entry = CachedVerdict {
            valid: response.valid,
            message: response.message.clone(),
            expires_at: expires_at.timestamp_millis(),
        };

        match serde_json::to_string(&entry) {
            Ok(json) => {
                self.cache.lock().unwrap().set(LICENSE_CACHE_KEY, &json);
                debug!("License validation cached");
                Some(expires_at)
            }
            Err(err) => {
                warn!(%err, "Failed to cache license validation");
                None
            }
        }
    }

    /// Resolve the license verdict, consulting the cache before the network.
    /// Never returns an error: every failure path resolves to an invalid
    /// verdict with a message.
    pub(crate) async fn validate(
        &mut self,
        config: &TrackerConfig,
        page: &dyn Page,
    ) -> LicenseVerdict {
        self.state = LicenseState::Checking;

        if config.api_key.is_empty() {
            error!("API key is required for license validation");
            self.state = LicenseState::Invalid;
            return LicenseVerdict {
                valid: false,
                message: Some("API key required".to_owned()),
                expires_at: None,
            };
        }

        if let Some(cached) = self.cached_verdict(config.cache_validation) {
            self.state = resolved_state(cached.valid);
            return cached;
        }

        debug!("Validating license with server");

        let request = ValidationRequest {
            api_key: config.api_key.clone(),
            domain: page.hostname(),
            url: page.url(),
            user_agent: page.user_agent(),
        };

        match self
            .transport
            .validate(&config.license_endpoint, &request)
            .await
        {
            Ok(response) => {
                // Only valid verdicts earn a cache entry.
                let expires_at = if response.valid {
                    self.store_verdict(config.cache_validation, &response, config.cache_duration)
                } else {
                    error!(
                        message = response.message.as_deref().unwrap_or("Unknown error"),
                        "Invalid license"
                    );
                    None
                };

                self.state = resolved_state(response.valid);
                LicenseVerdict {
                    valid: response.valid,
                    message: response.message,
                    expires_at,
                }
            }
            Err(err) => {
                error!(error = %err, "License validation failed");

                // One opportunistic cache re-read before giving up.
                if let Some(cached) = self.cached_verdict(config.cache_validation) {
                    debug!("Using cached license after a validation error");
                    self.state = resolved_state(cached.valid);
                    return cached;
                }

                self.state = LicenseState::Invalid;
                LicenseVerdict {
                    valid: false,
                    message: Some(format!("{err:#}")),
                    expires_at: None,
                }
            }
        }
    }
}

fn resolved_state(valid: bool) -> LicenseState {
    if valid {
        LicenseState::Valid
    } else {
        LicenseState::Invalid
    }
}
