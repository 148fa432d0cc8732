use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{HttpConfig, TargetConfig};
use crate::errors::{RetryPolicy, ScanError};
use super::identity::IdentityPool;
use super::request::{ProbeMethod, ProbeRequest};
use super::result::ProbeResult;

/// Statuses worth another attempt. Everything else is returned as data.
const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503, 504];

/// Bodies past this size are cut; signatures live near the top of a page.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

#[derive(Debug, Clone)]
struct ProbeSettings {
    timeout: Duration,
    verify_ssl: bool,
    max_redirects: usize,
    retry: RetryPolicy,
    min_interval: Duration,
}

/// Enforces a minimum spacing between requests of one session.
struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProbeStats {
    pub requests: u64,
    pub retries: u64,
    pub failures: u64,
}

/// HTTP client for talking to the target. Cheap to clone; clones share the
/// cookie jar. Use [`ProbeClient::fork_session`] for an independent jar.
#[derive(Clone)]
pub struct ProbeClient {
    http: Client,
    settings: Arc<ProbeSettings>,
    identities: Arc<IdentityPool>,
    throttle: Arc<Throttle>,
    counters: Arc<Counters>,
}

impl ProbeClient {
    pub fn new(target: &TargetConfig, http: &HttpConfig) -> Result<Self, ScanError> {
        let settings = ProbeSettings {
            timeout: Duration::from_secs(target.timeout_secs),
            verify_ssl: target.verify_ssl,
            max_redirects: target.max_redirects,
            retry: RetryPolicy {
                max_retries: http.max_retries,
                base_delay: Duration::from_millis(http.retry_base_delay_ms),
                max_delay: Duration::from_millis(http.max_retry_delay_ms),
            },
            min_interval: Duration::from_millis(http.min_interval_ms),
        };
        let identities = IdentityPool::new(&http.user_agents, &http.accept_languages);

        Ok(Self {
            http: build_http(&settings)?,
            throttle: Arc::new(Throttle::new(settings.min_interval)),
            settings: Arc::new(settings),
            identities: Arc::new(identities),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Independent session: fresh cookie jar and throttle, same configuration.
    /// Request counters stay shared so scan totals include every session.
    pub fn fork_session(&self) -> Result<Self, ScanError> {
        Ok(Self {
            http: build_http(&self.settings)?,
            settings: self.settings.clone(),
            identities: self.identities.clone(),
            throttle: Arc::new(Throttle::new(self.settings.min_interval)),
            counters: self.counters.clone(),
        })
    }

    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Send one request, retrying transport errors and transient statuses.
    pub async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ScanError> {
        let policy = &self.settings.retry;
        let max_attempts = policy.max_retries + 1;
        let description = request.describe();
        let mut last_error: Option<ScanError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(policy.backoff(attempt - 1)).await;
            }
            self.throttle.wait().await;
            self.counters.requests.fetch_add(1, Ordering::Relaxed);

            let started = Instant::now();
            let response = match self.build(request).send().await {
                Ok(response) => response,
                Err(e) if e.is_builder() => {
                    return Err(ScanError::InvalidTarget(format!("{}: {}", request.url, e)));
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        ScanError::Timeout(format!("{} timed out", description))
                    } else {
                        ScanError::Network(format!("{}: {}", description, e))
                    };
                    debug!(request = %description, attempt = attempt + 1, error = %err, "Probe failed");
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status().as_u16();
            if TRANSIENT_STATUSES.contains(&status) && attempt + 1 < max_attempts {
                debug!(request = %description, status, attempt = attempt + 1, "Transient status, retrying");
                continue;
            }

            let final_url = response.url().to_string();
            let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (name, value) in response.headers() {
                let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                headers.entry(name.as_str().to_string()).or_default().push(value);
            }

            let bytes = match read_capped(response, MAX_BODY_BYTES).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_decode() => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(ScanError::MalformedResponse(format!("{}: body could not be decoded: {}", description, e)));
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        ScanError::Timeout(format!("{} timed out reading body", description))
                    } else {
                        ScanError::Network(format!("{}: body could not be read: {}", description, e))
                    };
                    debug!(request = %description, attempt = attempt + 1, error = %err, "Body read failed");
                    last_error = Some(err);
                    continue;
                }
            };
            // Legacy charsets still carry signatures in their ASCII range.
            let body = String::from_utf8_lossy(&bytes).into_owned();

            return Ok(ProbeResult {
                request: description,
                final_url,
                status,
                headers,
                body,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        match last_error {
            Some(ScanError::Timeout(msg)) => {
                warn!(request = %description, attempts = max_attempts, "Probe timed out on final attempt");
                Err(ScanError::Timeout(msg))
            }
            Some(err) => {
                warn!(request = %description, attempts = max_attempts, error = %err, "Target unreachable");
                Err(ScanError::Unreachable(format!(
                    "{} failed after {} attempts: {}",
                    description, max_attempts, err
                )))
            }
            None => Err(ScanError::Internal("Probe loop exited without a result".into())),
        }
    }

    fn build(&self, request: &ProbeRequest) -> reqwest::RequestBuilder {
        let identity = self.identities.next();
        let mut builder = match request.method {
            ProbeMethod::Get => self.http.get(&request.url),
            ProbeMethod::Post => self.http.post(&request.url).form(&request.form),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .header(USER_AGENT, identity.user_agent)
            .header(ACCEPT_LANGUAGE, identity.accept_language)
            .header(ACCEPT, DEFAULT_ACCEPT)
    }
}

async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(bytes.len());
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if bytes.len() >= limit {
            debug!(limit, "Body truncated");
            break;
        }
    }
    Ok(bytes)
}

fn build_http(settings: &ProbeSettings) -> Result<Client, ScanError> {
    Client::builder()
        .timeout(settings.timeout)
        .cookie_store(true)
        .danger_accept_invalid_certs(!settings.verify_ssl)
        .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
        .build()
        .map_err(|e| ScanError::Config(format!("Failed to build HTTP client: {}", e)))
}
