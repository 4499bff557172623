//! File-based cache storage in msgpack format

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::CacheStore;
use crate::error::CacheError;
use crate::models::{ConversationId, Record};

/// Conversation list artifact name
const CONVERSATIONS_FILE: &str = "conversations.msgpack";

/// File-based cache storage
///
/// Directory structure:
/// ```text
/// missive.cache.d/
///   conversations.msgpack            # every conversation in the window
///   messages.<conversation>.msgpack  # one per conversation
/// ```
///
/// Each artifact is a msgpack array of maps. Writes go to a `.tmp` sibling
/// that is synced and then renamed over the artifact.
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    /// Open a cache at the given directory
    ///
    /// The directory is created lazily, on the first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversations_path(&self) -> PathBuf {
        self.root.join(CONVERSATIONS_FILE)
    }

    pub fn messages_path(&self, conversation_id: &ConversationId) -> Result<PathBuf, CacheError> {
        let id = conversation_id.as_str();
        if id.is_empty()
            || id == "."
            || id.contains("..")
            || id.contains(['/', '\\', '\0'])
        {
            return Err(CacheError::InvalidKey(id.to_string()));
        }
        Ok(self.root.join(format!("messages.{}.msgpack", id)))
    }

    fn write_artifact(&self, path: &Path, records: &[Record]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        let encoded = rmp_serde::to_vec(records)?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::io(&temp_path, e));
        }

        fs::rename(&temp_path, path).map_err(|e| CacheError::io(path, e))
    }

    fn read_artifact(path: &Path) -> Result<Vec<Record>, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::Miss {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        rmp_serde::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

impl CacheStore for FileCacheStore {
    fn write_conversations(&self, records: &[Record]) -> Result<(), CacheError> {
        self.write_artifact(&self.conversations_path(), records)
    }

    fn write_messages(
        &self,
        conversation_id: &ConversationId,
        records: &[Record],
    ) -> Result<(), CacheError> {
        let path = self.messages_path(conversation_id)?;
        self.write_artifact(&path, records)
    }

    fn read_conversations(&self) -> Result<Vec<Record>, CacheError> {
        Self::read_artifact(&self.conversations_path())
    }

    fn read_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Record>, CacheError> {
        Self::read_artifact(&self.messages_path(conversation_id)?)
    }

    fn has_messages(&self, conversation_id: &ConversationId) -> bool {
        self.messages_path(conversation_id)
            .is_ok_and(|path| path.is_file())
    }
}

/// Load the cached conversation list from a cache directory
pub fn load_conversations(cache_dir: impl AsRef<Path>) -> Result<Vec<Record>, CacheError> {
    FileCacheStore::new(cache_dir).read_conversations()
}

/// Load one conversation's cached messages from a cache directory
pub fn load_messages(
    cache_dir: impl AsRef<Path>,
    conversation_id: &ConversationId,
) -> Result<Vec<Record>, CacheError> {
    FileCacheStore::new(cache_dir).read_messages(conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: serde_json::Value) -> Record {
        Record::try_from(value).unwrap()
    }

    fn sample_conversations() -> Vec<Record> {
        vec![
            record(json!({
                "id": "c1",
                "subject": "Invoice",
                "last_activity_at": 1643673600,
                "shared": true,
                "assignees": [{"id": "u1", "name": "Ann"}],
                "color": null
            })),
            record(json!({"id": 2, "score": 0.75})),
        ]
    }

    #[test]
    fn test_write_read_conversations() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write_conversations(&sample_conversations()).unwrap();
        let read = store.read_conversations().unwrap();

        assert_eq!(read, sample_conversations());
    }

    #[test]
    fn test_write_read_messages() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let id = ConversationId::new("c1");
        let messages = vec![record(json!({"id": "m1"})), record(json!({"id": "m2"}))];

        store.write_messages(&id, &messages).unwrap();

        assert!(store.has_messages(&id));
        assert_eq!(store.read_messages(&id).unwrap(), messages);
        assert!(dir.path().join("messages.c1.msgpack").is_file());
    }

    #[test]
    fn test_empty_message_list_is_written() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let id = ConversationId::new("quiet");

        store.write_messages(&id, &[]).unwrap();

        assert!(store.read_messages(&id).unwrap().is_empty());
    }

    #[test]
    fn test_read_missing_is_cache_miss() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        assert!(matches!(store.read_conversations(), Err(CacheError::Miss { .. })));
        assert!(matches!(
            store.read_messages(&ConversationId::new("nope")),
            Err(CacheError::Miss { .. })
        ));
        assert!(!store.has_messages(&ConversationId::new("nope")));
    }

    #[test]
    fn test_read_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        fs::write(store.conversations_path(), b"\xc1\xc1 definitely not msgpack").unwrap();

        assert!(matches!(
            store.read_conversations(),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("missive.cache.d");
        let store = FileCacheStore::new(&root);

        store.write_conversations(&sample_conversations()).unwrap();

        assert!(root.join(CONVERSATIONS_FILE).is_file());
    }

    #[test]
    fn test_overwrite_replaces_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        store.write_conversations(&sample_conversations()).unwrap();
        let replacement = vec![record(json!({"id": "c9"}))];
        store.write_conversations(&replacement).unwrap();

        assert_eq!(store.read_conversations().unwrap(), replacement);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unsafe_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());

        for bad in ["", ".", "../escape", "a/b", "a\\b"] {
            let result = store.write_messages(&ConversationId::new(bad), &[]);
            assert!(
                matches!(result, Err(CacheError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_helpers() {
        let dir = tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        let id = ConversationId::new("c1");
        store.write_conversations(&sample_conversations()).unwrap();
        store.write_messages(&id, &[record(json!({"id": "m1"}))]).unwrap();

        assert_eq!(load_conversations(dir.path()).unwrap().len(), 2);
        assert_eq!(load_messages(dir.path(), &id).unwrap().len(), 1);
    }
}
