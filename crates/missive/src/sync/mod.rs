//! Sync engine for pulling Missive data into the cache
//!
//! Pages are fetched through a shared [`RetryPolicy`], gathered per
//! endpoint by [`collect`], and written by [`pull`] one complete
//! collection at a time.

mod collect;
mod pull;
mod retry;
mod timing;

pub use collect::{Collected, collect};
pub use pull::{SyncOptions, SyncProgress, SyncReport, SyncStats, pull, pull_with_progress};
pub use retry::{RateLimitGate, RetryPolicy};
pub use timing::{backoff_delay, next_delay};
