//! Authenticated blocking HTTP session.
//!
//! Owns the `Authorization` header and the rate-limit retry policy. Every
//! listing request in the crate goes through [`Session::get`] or
//! [`Session::post_json`].

use crate::error::{ExportError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT_VALUE: &str = concat!("perfexport/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Transport settings shared by every credential provider.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpSettings {
    pub fn client(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()?)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Value,
    /// Target of a `Link: <...>; rel="next"` header, if present.
    pub next_link: Option<String>,
}

pub struct Session {
    client: Client,
    authorization: String,
    accept: Option<String>,
    retry: RetryPolicy,
}

impl Session {
    pub fn new(settings: &HttpSettings, authorization: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: settings.client()?,
            authorization: authorization.into(),
            accept: None,
            retry: settings.retry,
        })
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn get(&self, url: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        self.execute(|| self.client.get(url).query(query))
    }

    pub fn post_json(&self, url: &str, body: &Value) -> Result<ApiResponse> {
        self.execute(|| self.client.post(url).json(body))
    }

    fn execute(&self, build: impl Fn() -> RequestBuilder) -> Result<ApiResponse> {
        let mut attempt = 0u32;
        loop {
            let mut request = build()
                .header(AUTHORIZATION, &self.authorization)
                .header(USER_AGENT, USER_AGENT_VALUE);
            if let Some(accept) = &self.accept {
                request = request.header(ACCEPT, accept);
            }

            let response = request.send()?;
            let status = response.status();
            let headers = response.headers().clone();
            let text = response.text()?;
            debug!("Response status: {}", status);

            if is_rate_limited(status, &headers, &text) {
                if attempt >= self.retry.max_retries {
                    return Err(ExportError::RateLimit { attempts: attempt + 1 });
                }
                let wait = backoff_from_headers(&headers, chrono::Utc::now().timestamp(), attempt)
                    .min(self.retry.max_backoff);
                warn!(
                    "Rate limited ({}), retrying in {}s (attempt {}/{})",
                    status,
                    wait.as_secs(),
                    attempt + 1,
                    self.retry.max_retries
                );
                std::thread::sleep(wait);
                attempt += 1;
                continue;
            }

            return read_response(status, &headers, &text);
        }
    }
}

fn read_response(status: StatusCode, headers: &HeaderMap, text: &str) -> Result<ApiResponse> {
    let next_link = headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_next_link);

    if status == StatusCode::UNAUTHORIZED {
        return Err(ExportError::Auth(extract_error_message(text, status)));
    }
    if !status.is_success() {
        return Err(ExportError::Api {
            status: status.as_u16(),
            message: extract_error_message(text, status),
        });
    }

    let body = if text.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(text)?
    };

    Ok(ApiResponse { body, next_link })
}

/// Google's per-error reasons for quota exhaustion, sent with a plain 403.
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Status 429, or a 403 that carries GitHub's exhausted-quota or secondary-limit
/// headers, or a Google rate-limit reason in its error body.
pub fn is_rate_limited(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    exhausted || headers.contains_key(RETRY_AFTER) || has_rate_limit_reason(body)
}

fn has_rate_limit_reason(body: &str) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    parsed
        .pointer("/error/errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("reason").and_then(Value::as_str))
        .any(|reason| RATE_LIMIT_REASONS.contains(&reason))
}

/// Wait interval indicated by the server, or an exponential fallback.
pub fn backoff_from_headers(headers: &HeaderMap, now_epoch: i64, attempt: u32) -> Duration {
    if let Some(secs) = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs);
    }

    if let Some(reset) = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return Duration::from_secs((reset - now_epoch + 1).max(0) as u64);
    }

    Duration::from_secs(1u64 << attempt.min(6))
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Pulls a human-readable message out of a Google (`{"error":{"message"}}`),
/// OAuth (`{"error_description"}`) or GitHub (`{"message"}`) error body.
pub(crate) fn extract_error_message(body: &str, status: StatusCode) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return format!("HTTP {status}"),
    };

    let message = parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .or_else(|| parsed.get("error_description"))
        .or_else(|| parsed.get("message"))
        .or_else(|| parsed.get("error"))
        .and_then(|v| v.as_str());

    match message {
        Some(m) => m.to_string(),
        None => format!("HTTP {status}"),
    }
}
