//! MEGA API client with request/response handling.
//!
//! One [`ApiClient`] is shared by every concurrent download. It owns the
//! request sequence number, the session id, the pacing clock and the abort
//! flag, so callers only need a shared reference.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::api::error::ApiErrorCode;
use crate::api::hashcash::solve_challenge;
use crate::config::{Config, Range};
use crate::error::{MegaError, Result};
use crate::http::HttpClient;

/// Base URL for MEGA API
pub const API_URL: &str = "https://g.api.mega.co.nz/cs";

/// Extra jitter (seconds) added on top of the base pacing delay.
const PACING_JITTER: f64 = 0.75;

/// What a decoded response means for the retry loop.
#[derive(Debug)]
enum Verdict {
    Done(Value),
    Retry(String),
    Fail(MegaError),
}

/// Interpret a decoded API response.
fn classify(response: Value) -> Verdict {
    fn int_verdict(code: i64) -> Verdict {
        if code == 0 {
            return Verdict::Done(Value::from(0));
        }
        if ApiErrorCode::from(code) == ApiErrorCode::Again {
            return Verdict::Retry("EAGAIN, request failed, retrying".to_string());
        }
        Verdict::Fail(ApiErrorCode::to_error(code))
    }

    match response {
        Value::Number(n) => match n.as_i64() {
            Some(code) => int_verdict(code),
            None => Verdict::Fail(MegaError::Protocol(format!("Unknown response: {}", n))),
        },
        Value::Array(mut items) => {
            if items.is_empty() {
                return Verdict::Fail(MegaError::Protocol("Unknown response: []".to_string()));
            }
            let first = items.swap_remove(0);
            match first.as_i64() {
                Some(code) => int_verdict(code),
                None => Verdict::Done(first),
            }
        }
        other => Verdict::Fail(MegaError::Protocol(format!("Unknown response: {}", other))),
    }
}

/// MEGA API client.
#[derive(Debug)]
pub struct ApiClient {
    http: HttpClient,
    api_url: String,
    sequence: AtomicU32,
    session_id: RwLock<Option<String>>,
    retries: u32,
    retry_delay: Range,
    request_delay: Option<f64>,
    last_request: Mutex<Option<Instant>>,
    abort: Arc<AtomicBool>,
}

impl ApiClient {
    /// Create a client from configuration, sharing the given abort flag.
    pub fn new(config: &Config, abort: Arc<AtomicBool>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::from_config(config)?,
            api_url: API_URL.to_string(),
            sequence: AtomicU32::new(rand::random()),
            session_id: RwLock::new(None),
            retries: config.retries,
            retry_delay: config.retry_delay,
            request_delay: (!config.nodelay).then_some(config.request_delay),
            last_request: Mutex::new(None),
            abort,
        })
    }

    /// Point the client at another API endpoint.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// The underlying HTTP client, used for content downloads.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Set the session ID for authenticated requests.
    pub fn set_session_id(&self, sid: String) {
        *self.session_id.write().unwrap_or_else(|e| e.into_inner()) = Some(sid);
    }

    /// Get the current session ID, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Shared abort flag.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Whether the abort flag was raised.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Raise the abort flag.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    fn next_url(&self, params: &[(&str, &str)]) -> String {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut url = format!("{}?id={}", self.api_url, id);
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, value));
        }
        if let Some(sid) = self.session_id() {
            url.push_str(&format!("&sid={}", sid));
        }
        url
    }

    /// Space consecutive API calls by a jittered delay.
    async fn pace(&self) {
        let Some(base) = self.request_delay else {
            return;
        };
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let gap = rand::thread_rng().gen_range(base..=base + PACING_JITTER);
            let due = previous + Duration::from_secs_f64(gap);
            let now = Instant::now();
            if due > now {
                tokio::time::sleep(due - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn backoff(&self) {
        let Range { min, max } = self.retry_delay;
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Send a single command and return its first result element.
    ///
    /// A plain `0` reply is returned as `0`. `EAGAIN` and transport errors
    /// are retried with a randomized backoff; any other integer reply fails
    /// at once. Connection-establishment failures do not consume the retry
    /// budget. A hashcash challenge is answered once per attempt; a second
    /// challenge in a row is fatal.
    pub async fn query(&self, payload: Value, params: &[(&str, &str)]) -> Result<Value> {
        let action = payload
            .get("a")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let body = serde_json::to_string(&[&payload])?;

        let mut retries = 0u32;
        while retries <= self.retries {
            if self.is_aborted() {
                return Err(MegaError::Aborted);
            }

            self.pace().await;
            let url = self.next_url(params);
            trace!(action = %action, url = %url, body = %body, "api request");

            let failure = match self.attempt(&url, &body).await {
                Ok(value) => match classify(value) {
                    Verdict::Done(value) => return Ok(value),
                    Verdict::Fail(err) => {
                        error!(action = %action, attempt = retries + 1, "api request failed: {}", err);
                        return Err(err);
                    }
                    Verdict::Retry(reason) => MegaError::Custom(reason),
                },
                Err(err) if err.is_transient() || matches!(err, MegaError::JsonError(_)) => err,
                Err(err) => {
                    error!(action = %action, attempt = retries + 1, "api request failed: {}", err);
                    return Err(err);
                }
            };

            let connect_failure = matches!(&failure, MegaError::RequestError(e) if e.is_connect());
            warn!(
                action = %action,
                attempt = retries + 1,
                "api request exception: {}",
                failure
            );
            if !connect_failure {
                retries += 1;
            }
            if self.is_aborted() {
                return Err(MegaError::Aborted);
            }
            if retries <= self.retries {
                self.backoff().await;
            }
        }

        error!(action = %action, "Unable to connect. Aborting");
        Err(MegaError::Connection { attempts: retries })
    }

    /// One POST, including a hashcash round trip if requested.
    async fn attempt(&self, url: &str, body: &str) -> Result<Value> {
        let mut reply = self.http.post_json(url, body, None).await?;

        if let Some(challenge) = reply.hashcash.take() {
            let answer = solve_challenge(&challenge).await?;
            info!("Solving hashcash challenge: {} -> {}", challenge, answer);
            reply = self.http.post_json(url, body, Some(&answer)).await?;
            if let Some(again) = reply.hashcash {
                return Err(MegaError::Protocol(format!(
                    "Server rejected the proof of work and sent another challenge: {}",
                    again
                )));
            }
        }

        debug!(bytes = reply.body.len(), "api response");
        Ok(serde_json::from_str(&reply.body)?)
    }
}
