//! Storage trait definitions

use crate::error::CacheError;
use crate::models::{ConversationId, Record};

/// Keyed store for complete record collections
///
/// Every write replaces the whole collection for its key. Readers never
/// observe a partially written collection.
pub trait CacheStore: Send + Sync {
    /// Replace the conversation list
    fn write_conversations(&self, records: &[Record]) -> Result<(), CacheError>;

    /// Replace the message list of one conversation
    fn write_messages(
        &self,
        conversation_id: &ConversationId,
        records: &[Record],
    ) -> Result<(), CacheError>;

    /// Read the conversation list
    ///
    /// Fails with [`CacheError::Miss`] if it was never written.
    fn read_conversations(&self) -> Result<Vec<Record>, CacheError>;

    /// Read the message list of one conversation
    fn read_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Record>, CacheError>;

    /// Check if a message list exists for a conversation
    fn has_messages(&self, conversation_id: &ConversationId) -> bool;
}
