//! Missive crate - pull-and-cache engine for a Missive team inbox
//!
//! This crate provides:
//! - Time window resolution for a pull
//! - A Missive API client behind the [`PageFetcher`] trait
//! - Pagination, deduplication and retry with shared rate-limit backoff
//! - An atomic msgpack cache of conversations and per-conversation messages
//! - The sync orchestration tying those together
//!
//! Records are kept opaque: only their `id` is interpreted, so the cache
//! holds exactly what the service returned.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;

pub use api::{Cursor, Endpoint, MissiveClient, Page, PageFetcher, PageLimits};
pub use self::config::{MissiveCredentials, SyncSettings};
pub use error::{CacheError, ConversationFailure, FetchError, SyncError, WindowError};
pub use models::{ConversationId, Delta, DeltaUnit, Record, TimeWindow, WindowRequest, parse_instant};
pub use storage::{CacheStore, FileCacheStore, InMemoryCacheStore, load_conversations, load_messages};
pub use sync::{
    Collected, RateLimitGate, RetryPolicy, SyncOptions, SyncProgress, SyncReport, SyncStats,
    collect, pull, pull_with_progress,
};
