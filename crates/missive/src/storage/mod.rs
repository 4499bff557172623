//! Cache storage for pulled records
//!
//! The sync engine writes through the [`CacheStore`] trait. The on-disk
//! implementation keeps one msgpack artifact per logical key; the in-memory
//! one backs tests.

mod file;
mod memory;
mod traits;

pub use file::{FileCacheStore, load_conversations, load_messages};
pub use memory::InMemoryCacheStore;
pub use traits::CacheStore;
