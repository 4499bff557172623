//! Missive API integration
//!
//! This module provides:
//! - The [`PageFetcher`] seam the sync engine paginates through
//! - [`MissiveClient`], the HTTP implementation of it
//! - Response envelope types

mod client;

pub use client::{MissiveClient, PageLimits};

use std::fmt;

use crate::error::FetchError;
use crate::models::{ConversationId, Record, TimeWindow};

/// One of the two listing endpoints the pull uses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// All conversations in the inbox
    Conversations,
    /// Messages of a single conversation
    Messages(ConversationId),
}

impl Endpoint {
    /// Record field Missive paginates this endpoint by
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            Self::Conversations => "last_activity_at",
            Self::Messages(_) => "delivered_at",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversations => f.write_str("conversations"),
            Self::Messages(id) => write!(f, "conversations/{id}/messages"),
        }
    }
}

/// Opaque continuation token for the next page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` once the service signals there is nothing more
    pub next_cursor: Option<Cursor>,
}

impl Page {
    pub fn new(records: Vec<Record>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// A page with no continuation
    pub fn last(records: Vec<Record>) -> Self {
        Self::new(records, None)
    }
}

/// Fetches one page of one endpoint
///
/// Implementations make exactly one remote call per invocation and
/// classify failures as transient or fatal; retrying is the caller's job.
pub trait PageFetcher: Send + Sync {
    fn fetch(
        &self,
        endpoint: &Endpoint,
        window: &TimeWindow,
        cursor: Option<&Cursor>,
    ) -> Result<Page, FetchError>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch(
        &self,
        endpoint: &Endpoint,
        window: &TimeWindow,
        cursor: Option<&Cursor>,
    ) -> Result<Page, FetchError> {
        (**self).fetch(endpoint, window, cursor)
    }
}

/// Missive API response envelopes
pub mod envelope {
    use serde::Deserialize;

    use crate::models::Record;

    /// Response from `GET conversations`
    #[derive(Debug, Deserialize)]
    pub struct ConversationsResponse {
        #[serde(default)]
        pub conversations: Vec<Record>,
    }

    /// Response from `GET conversations/{id}/messages`
    #[derive(Debug, Deserialize)]
    pub struct MessagesResponse {
        #[serde(default)]
        pub messages: Vec<Record>,
    }
}
