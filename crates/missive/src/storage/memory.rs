//! In-memory cache storage, used by tests

use std::collections::HashMap;
use std::sync::RwLock;

use super::CacheStore;
use crate::error::CacheError;
use crate::models::{ConversationId, Record};

/// In-memory implementation of CacheStore
///
/// Uses RwLock-protected collections; misses report a synthetic path.
#[derive(Default)]
pub struct InMemoryCacheStore {
    conversations: RwLock<Option<Vec<Record>>>,
    messages: RwLock<HashMap<ConversationId, Vec<Record>>>,
    /// Order in which message lists were written
    write_log: RwLock<Vec<ConversationId>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation ids in the order their messages were written
    pub fn message_write_order(&self) -> Vec<ConversationId> {
        self.write_log.read().unwrap().clone()
    }

    /// Number of message lists held
    pub fn message_lists(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    fn miss(key: &str) -> CacheError {
        CacheError::Miss {
            path: format!("memory://{}", key).into(),
        }
    }
}

impl CacheStore for InMemoryCacheStore {
    fn write_conversations(&self, records: &[Record]) -> Result<(), CacheError> {
        *self.conversations.write().unwrap() = Some(records.to_vec());
        Ok(())
    }

    fn write_messages(
        &self,
        conversation_id: &ConversationId,
        records: &[Record],
    ) -> Result<(), CacheError> {
        self.messages
            .write()
            .unwrap()
            .insert(conversation_id.clone(), records.to_vec());
        self.write_log.write().unwrap().push(conversation_id.clone());
        Ok(())
    }

    fn read_conversations(&self) -> Result<Vec<Record>, CacheError> {
        self.conversations
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Self::miss("conversations"))
    }

    fn read_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Record>, CacheError> {
        self.messages
            .read()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Self::miss(conversation_id.as_str()))
    }

    fn has_messages(&self, conversation_id: &ConversationId) -> bool {
        self.messages.read().unwrap().contains_key(conversation_id)
    }
}
