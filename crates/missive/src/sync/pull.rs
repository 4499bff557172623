//! Full pull: conversations, then each conversation's messages

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;

use super::collect::{Collected, collect};
use super::RetryPolicy;
use crate::api::{Endpoint, PageFetcher};
use crate::error::{ConversationFailure, SyncError};
use crate::models::{ConversationId, TimeWindow};
use crate::storage::CacheStore;

/// Options for a pull
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Retry policy shared by every request of the pull
    pub retry: RetryPolicy,
    /// Conversations whose messages are fetched concurrently (1 = sequential)
    pub workers: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            workers: 1,
        }
    }
}

/// Statistics from a pull
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncStats {
    /// Conversations cached
    pub conversations: usize,
    /// Messages cached across all conversations
    pub messages: usize,
    /// Pages fetched across all endpoints
    pub pages: usize,
    /// Records dropped as repeats of an id seen on an earlier page
    pub duplicates: usize,
    /// Duration of the pull
    pub duration_ms: u64,
}

impl SyncStats {
    fn absorb(&mut self, collected: &Collected) {
        self.pages += collected.pages;
        self.duplicates += collected.duplicates;
    }
}

/// Outcome of the message phase of a pull
#[derive(Debug, Default)]
pub struct SyncReport {
    pub stats: SyncStats,
    /// Conversations whose messages were cached, in conversation order
    pub succeeded: Vec<ConversationId>,
    /// Conversations whose messages could not be fetched or cached
    pub failed: Vec<(ConversationId, ConversationFailure)>,
    /// Conversations not attempted because an earlier one failed
    pub skipped: Vec<ConversationId>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Last conversation whose messages reached the cache
    pub fn last_cached(&self) -> Option<&ConversationId> {
        self.succeeded.last()
    }

    pub fn first_failed(&self) -> Option<&str> {
        self.failed.first().map(|(id, _)| id.as_str())
    }
}

/// Progress notifications for UI consumers
#[derive(Debug)]
pub enum SyncProgress<'a> {
    /// The conversation list was written
    ConversationsCached { count: usize },
    /// One conversation's messages were written
    MessagesCached {
        conversation_id: &'a ConversationId,
        count: usize,
        finished: usize,
        total: usize,
    },
    /// One conversation's messages could not be cached
    MessagesFailed {
        conversation_id: &'a ConversationId,
        error: &'a ConversationFailure,
        finished: usize,
        total: usize,
    },
}

enum Outcome {
    Cached(Collected),
    Failed(ConversationFailure),
    Skipped,
}

/// Pull conversations and their messages into `store`
///
/// Equivalent to [`pull_with_progress`] with no progress callback.
pub fn pull(
    fetcher: &dyn PageFetcher,
    store: &dyn CacheStore,
    window: &TimeWindow,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    pull_with_progress(fetcher, store, window, options, &|_| {})
}

/// Pull conversations and their messages into `store`
///
/// 1. Collect every conversation in the window and cache the list
/// 2. For each conversation, collect its messages and cache them
///
/// A failure while listing conversations writes nothing. Once a
/// conversation's messages fail, no further conversations are started;
/// ones already in flight finish and are cached. Artifacts written before
/// the failure stay valid, so re-running simply overwrites them.
pub fn pull_with_progress(
    fetcher: &dyn PageFetcher,
    store: &dyn CacheStore,
    window: &TimeWindow,
    options: &SyncOptions,
    on_progress: &(dyn Fn(SyncProgress<'_>) + Sync),
) -> Result<SyncReport, SyncError> {
    let start = Instant::now();
    let mut report = SyncReport::default();

    info!("Loading conversations in {}", window);
    let conversations = collect(fetcher, &options.retry, &Endpoint::Conversations, window)
        .map_err(SyncError::Conversations)?;
    report.stats.absorb(&conversations);

    store
        .write_conversations(&conversations.records)
        .map_err(SyncError::ConversationsCache)?;
    report.stats.conversations = conversations.records.len();
    info!("Cached {} conversations", report.stats.conversations);
    on_progress(SyncProgress::ConversationsCached {
        count: report.stats.conversations,
    });

    // Every collected record has an id; collect rejects pages without one.
    let ids: Vec<ConversationId> = conversations
        .records
        .iter()
        .filter_map(|r| r.conversation_id())
        .collect();
    let total = ids.len();
    let stop = AtomicBool::new(false);
    let finished = AtomicUsize::new(0);

    let process = |id: &ConversationId| -> Outcome {
        if stop.load(Ordering::SeqCst) {
            return Outcome::Skipped;
        }
        let outcome = sync_conversation(fetcher, store, &options.retry, window, id);
        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
        match outcome {
            Ok(collected) => {
                on_progress(SyncProgress::MessagesCached {
                    conversation_id: id,
                    count: collected.records.len(),
                    finished: done,
                    total,
                });
                Outcome::Cached(collected)
            }
            Err(error) => {
                stop.store(true, Ordering::SeqCst);
                warn!("Messages for conversation {} failed: {}", id, error);
                on_progress(SyncProgress::MessagesFailed {
                    conversation_id: id,
                    error: &error,
                    finished: done,
                    total,
                });
                Outcome::Failed(error)
            }
        }
    };

    let outcomes: Vec<Outcome> = match worker_pool(options.workers) {
        Some(pool) => pool.install(|| ids.par_iter().map(&process).collect()),
        None => ids.iter().map(&process).collect(),
    };

    for (id, outcome) in ids.into_iter().zip(outcomes) {
        match outcome {
            Outcome::Cached(collected) => {
                report.stats.messages += collected.records.len();
                report.stats.absorb(&collected);
                report.succeeded.push(id);
            }
            Outcome::Failed(error) => report.failed.push((id, error)),
            Outcome::Skipped => report.skipped.push(id),
        }
    }

    report.stats.duration_ms = start.elapsed().as_millis() as u64;

    if report.failed.is_empty() {
        info!(
            "Pull complete: {} conversations, {} messages in {} ms",
            report.stats.conversations, report.stats.messages, report.stats.duration_ms
        );
        Ok(report)
    } else {
        Err(SyncError::Incomplete(report))
    }
}

/// Collect and cache one conversation's messages
fn sync_conversation(
    fetcher: &dyn PageFetcher,
    store: &dyn CacheStore,
    retry: &RetryPolicy,
    window: &TimeWindow,
    id: &ConversationId,
) -> Result<Collected, ConversationFailure> {
    let collected = collect(fetcher, retry, &Endpoint::Messages(id.clone()), window)?;
    if collected.records.is_empty() {
        warn!("No messages found for conversation {}", id);
    }
    store.write_messages(id, &collected.records)?;
    info!(
        "Cached {} messages for conversation {}",
        collected.records.len(),
        id
    );
    Ok(collected)
}

/// Thread pool for concurrent message fetching, if more than one worker
fn worker_pool(workers: usize) -> Option<rayon::ThreadPool> {
    if workers <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("pull-worker-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Could not start {} workers ({}); fetching sequentially", workers, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Cursor, Page};
    use crate::error::FetchError;
    use crate::models::Record;
    use crate::storage::InMemoryCacheStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// One page per endpoint; conversations listed in `failing` fail fatally
    #[derive(Default)]
    struct FakeInbox {
        conversations: Vec<&'static str>,
        messages: HashMap<&'static str, Vec<&'static str>>,
        failing: Vec<&'static str>,
        conversations_error: Option<FetchError>,
        requested: Mutex<Vec<String>>,
    }

    impl PageFetcher for FakeInbox {
        fn fetch(
            &self,
            endpoint: &Endpoint,
            _window: &TimeWindow,
            _cursor: Option<&Cursor>,
        ) -> Result<Page, FetchError> {
            self.requested.lock().unwrap().push(endpoint.to_string());
            let ids: Vec<&str> = match endpoint {
                Endpoint::Conversations => {
                    if let Some(e) = &self.conversations_error {
                        return Err(e.clone());
                    }
                    self.conversations.clone()
                }
                Endpoint::Messages(id) => {
                    if self.failing.iter().any(|f| *f == id.as_str()) {
                        return Err(FetchError::fatal(format!("{} is gone", id)));
                    }
                    self.messages.get(id.as_str()).cloned().unwrap_or_default()
                }
            };
            Ok(Page::last(
                ids.into_iter()
                    .map(|id| Record::try_from(json!({"id": id})).unwrap())
                    .collect(),
            ))
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn options(workers: usize) -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy::immediate(2),
            workers,
        }
    }

    fn inbox(conversations: &[&'static str]) -> FakeInbox {
        FakeInbox {
            conversations: conversations.to_vec(),
            messages: conversations
                .iter()
                .map(|c| (*c, vec!["m1", "m2"]))
                .collect(),
            ..Default::default()
        }
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records.iter().filter_map(Record::id).collect()
    }

    #[test]
    fn test_caches_conversations_and_messages_in_order() {
        let fetcher = inbox(&["a", "b", "c"]);
        let store = InMemoryCacheStore::new();

        let report = pull(&fetcher, &store, &window(), &options(1)).unwrap();

        assert!(report.is_complete());
        assert_eq!(ids(&store.read_conversations().unwrap()), ["a", "b", "c"]);
        assert_eq!(
            store.message_write_order(),
            ["a", "b", "c"].map(ConversationId::from)
        );
        assert_eq!(report.stats.conversations, 3);
        assert_eq!(report.stats.messages, 6);
        assert_eq!(report.stats.pages, 4);
    }

    #[test]
    fn test_conversation_failure_writes_nothing() {
        let fetcher = FakeInbox {
            conversations_error: Some(FetchError::fatal("401")),
            ..inbox(&["a"])
        };
        let store = InMemoryCacheStore::new();

        let err = pull(&fetcher, &store, &window(), &options(1)).unwrap_err();

        assert!(matches!(err, SyncError::Conversations(_)));
        assert!(store.read_conversations().is_err());
        assert_eq!(store.message_lists(), 0);
    }

    #[test]
    fn test_stops_after_first_failed_conversation() {
        let fetcher = FakeInbox {
            failing: vec!["b"],
            ..inbox(&["a", "b", "c"])
        };
        let store = InMemoryCacheStore::new();

        let err = pull(&fetcher, &store, &window(), &options(1)).unwrap_err();

        let SyncError::Incomplete(report) = err else {
            panic!("expected an incomplete pull, got {err:?}");
        };
        assert_eq!(report.succeeded, [ConversationId::from("a")]);
        assert_eq!(report.first_failed(), Some("b"));
        assert_eq!(report.skipped, [ConversationId::from("c")]);
        assert_eq!(report.last_cached(), Some(&ConversationId::from("a")));

        assert!(store.read_conversations().is_ok());
        assert!(store.has_messages(&ConversationId::from("a")));
        assert!(!store.has_messages(&ConversationId::from("b")));
        assert!(!store.has_messages(&ConversationId::from("c")));
        assert!(
            !fetcher
                .requested
                .lock()
                .unwrap()
                .contains(&"conversations/c/messages".to_string())
        );
    }

    #[test]
    fn test_parallel_workers_cache_everything() {
        let names: Vec<&'static str> = vec!["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7"];
        let fetcher = inbox(&names);
        let store = InMemoryCacheStore::new();

        let report = pull(&fetcher, &store, &window(), &options(4)).unwrap();

        assert_eq!(
            report.succeeded,
            names.iter().map(|n| ConversationId::from(*n)).collect::<Vec<_>>()
        );
        assert_eq!(store.message_lists(), names.len());
        assert_eq!(report.stats.messages, names.len() * 2);
    }

    #[test]
    fn test_parallel_failure_is_reported() {
        let fetcher = FakeInbox {
            failing: vec!["c1"],
            ..inbox(&["c0", "c1", "c2", "c3"])
        };
        let store = InMemoryCacheStore::new();

        let err = pull(&fetcher, &store, &window(), &options(2)).unwrap_err();

        assert_eq!(err.failed_conversations(), [&ConversationId::from("c1")]);
        let SyncError::Incomplete(report) = err else {
            unreachable!();
        };
        // Everything not failed was either cached or skipped, never lost.
        assert_eq!(report.succeeded.len() + report.skipped.len(), 3);
        for id in &report.succeeded {
            assert!(store.has_messages(id));
        }
        for id in &report.skipped {
            assert!(!store.has_messages(id));
        }
    }

    #[test]
    fn test_progress_events() {
        let fetcher = inbox(&["a", "b"]);
        let store = InMemoryCacheStore::new();
        let events = Mutex::new(Vec::new());

        pull_with_progress(&fetcher, &store, &window(), &options(1), &|event| {
            let line = match event {
                SyncProgress::ConversationsCached { count } => format!("conversations {count}"),
                SyncProgress::MessagesCached {
                    conversation_id,
                    count,
                    finished,
                    total,
                } => format!("{conversation_id} {count} {finished}/{total}"),
                SyncProgress::MessagesFailed {
                    conversation_id, ..
                } => format!("{conversation_id} failed"),
            };
            events.lock().unwrap().push(line);
        })
        .unwrap();

        assert_eq!(
            events.into_inner().unwrap(),
            ["conversations 2", "a 2 1/2", "b 2 2/2"]
        );
    }

    #[test]
    fn test_empty_inbox() {
        let fetcher = inbox(&[]);
        let store = InMemoryCacheStore::new();

        let report = pull(&fetcher, &store, &window(), &options(1)).unwrap();

        assert!(report.succeeded.is_empty());
        assert!(store.read_conversations().unwrap().is_empty());
    }
}
