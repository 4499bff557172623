//! Missive API HTTP client
//!
//! Fetches single pages of conversations and messages.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

use super::envelope::{ConversationsResponse, MessagesResponse};
use super::{Cursor, Endpoint, Page, PageFetcher};
use crate::error::FetchError;
use crate::models::{Record, TimeWindow};

/// Page sizes requested from each endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub conversations: usize,
    pub messages: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            conversations: 50,
            messages: 10,
        }
    }
}

impl PageLimits {
    fn for_endpoint(&self, endpoint: &Endpoint) -> usize {
        match endpoint {
            Endpoint::Conversations => self.conversations,
            Endpoint::Messages(_) => self.messages,
        }
    }
}

/// Missive REST client for the two listing endpoints
pub struct MissiveClient {
    agent: ureq::Agent,
    api_key: String,
    inbox_id: String,
    api_base: String,
    limits: PageLimits,
}

impl MissiveClient {
    /// Public API base URL
    pub const DEFAULT_API_BASE: &'static str = "https://public.missiveapp.com/v1/";

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a client for one inbox
    ///
    /// # Arguments
    /// * `api_key` - Missive API token, sent as a bearer token
    /// * `inbox_id` - Team inbox whose conversations are listed
    pub fn new(api_key: impl Into<String>, inbox_id: impl Into<String>) -> Self {
        Self {
            agent: Self::build_agent(Self::DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            inbox_id: inbox_id.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            limits: PageLimits::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let mut base = api_base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.api_base = base;
        self
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::build_agent(timeout);
        self
    }

    /// Use a preconfigured agent (proxy settings, TLS, test servers)
    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = agent;
        self
    }

    fn build_agent(timeout: Duration) -> ureq::Agent {
        // Status codes are classified by hand so Retry-After stays readable.
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into()
    }

    fn url(&self, endpoint: &Endpoint) -> String {
        match endpoint {
            Endpoint::Conversations => format!("{}conversations", self.api_base),
            Endpoint::Messages(id) => format!(
                "{}conversations/{}/messages",
                self.api_base,
                urlencoding::encode(id.as_str())
            ),
        }
    }

    /// Send one GET and decode the envelope
    fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        limit: usize,
        until: &str,
    ) -> Result<T, FetchError> {
        let url = self.url(endpoint);
        debug!("GET {} until={} limit={}", url, until, limit);

        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .query("limit", limit.to_string())
            .query("until", until);
        if *endpoint == Endpoint::Conversations {
            request = request.query("team_all", &self.inbox_id);
        }

        let mut response = request
            .call()
            .map_err(|e| classify_transport_error(endpoint, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok());
            return Err(classify_status(endpoint, status, retry_after));
        }

        response
            .body_mut()
            .read_json::<T>()
            .map_err(|e| FetchError::fatal(format!("Failed to parse {} response: {}", endpoint, e)))
    }
}

impl PageFetcher for MissiveClient {
    fn fetch(
        &self,
        endpoint: &Endpoint,
        window: &TimeWindow,
        cursor: Option<&Cursor>,
    ) -> Result<Page, FetchError> {
        let limit = self.limits.for_endpoint(endpoint);
        let until = match cursor {
            Some(cursor) => cursor.as_str().to_string(),
            None => window.until().timestamp().to_string(),
        };

        let records = match endpoint {
            Endpoint::Conversations => {
                self.get_json::<ConversationsResponse>(endpoint, limit, &until)?
                    .conversations
            }
            Endpoint::Messages(_) => {
                self.get_json::<MessagesResponse>(endpoint, limit, &until)?
                    .messages
            }
        };

        finish_page(endpoint, window, records, limit)
    }
}

/// Apply Missive's pagination semantics to one decoded page.
///
/// Missive lists newest first and pages backwards with an inclusive `until`.
/// Records stamped at or after the window end are dropped, as are records
/// older than the window start. There is no lower bound on the request, so
/// crossing the start ends the listing. A short or empty page also ends it;
/// otherwise the last record's timestamp becomes the next cursor.
fn finish_page(
    endpoint: &Endpoint,
    window: &TimeWindow,
    records: Vec<Record>,
    limit: usize,
) -> Result<Page, FetchError> {
    let field = endpoint.timestamp_field();
    let full = !records.is_empty() && records.len() >= limit;
    let last_stamp = records.last().and_then(|r| r.get(field)).cloned();

    let mut crossed_start = false;
    let kept: Vec<Record> = records
        .into_iter()
        .filter(|r| match r.number(field) {
            Some(ts) if window.starts_after(ts) => {
                crossed_start = true;
                false
            }
            Some(ts) => !window.ends_by(ts),
            None => true,
        })
        .collect();

    if crossed_start || !full {
        return Ok(Page::last(kept));
    }

    let next = match last_stamp {
        Some(serde_json::Value::Number(n)) => Cursor::new(n.to_string()),
        _ => {
            return Err(FetchError::fatal(format!(
                "Cannot continue {} pagination: last record has no numeric `{}`",
                endpoint, field
            )));
        }
    };

    Ok(Page::new(kept, Some(next)))
}

/// Map a non-2xx status to a fetch error
fn classify_status(endpoint: &Endpoint, status: u16, retry_after: Option<&str>) -> FetchError {
    match status {
        429 => FetchError::rate_limited(
            format!("{} rate limited (429)", endpoint),
            retry_after.and_then(parse_retry_after),
        ),
        500..=599 => FetchError::transient(format!("{} returned server error {}", endpoint, status)),
        401 | 403 => FetchError::fatal(format!(
            "{} rejected the API key ({}); check MISSIVE_API_KEY",
            endpoint, status
        )),
        404 => FetchError::fatal(format!("{} not found (404)", endpoint)),
        _ => FetchError::fatal(format!("{} returned unexpected status {}", endpoint, status)),
    }
}

/// Map a transport-level failure to a fetch error
fn classify_transport_error(endpoint: &Endpoint, error: ureq::Error) -> FetchError {
    match error {
        ureq::Error::StatusCode(status) => classify_status(endpoint, status, None),
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => {
            FetchError::transient(format!("Request to {} failed: {}", endpoint, error))
        }
        other => FetchError::fatal(format!("Request to {} failed: {}", endpoint, other)),
    }
}

/// Retry-After in delay-seconds form; HTTP-date values are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
