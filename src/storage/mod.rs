//! Persistent storage for llm-council
//!
//! Layout under the data directory:
//!
//! <data_dir>/
//! ├── .copilot_token        # Encrypted GitHub access token (0600)
//! ├── .encryption_key       # Key for the token above (0600)
//! └── conversations/
//!     └── {id}.json

use crate::council::{Stage1Response, Stage2Ranking, Stage3Result};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_TITLE: &str = "New Conversation";

/// Write `content` to `path` atomically with owner-only permissions
pub fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Write to temp file first, then rename (atomic)
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp_path, perms)
            .with_context(|| format!("Failed to set permissions on {}", temp_path.display()))?;
    }

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(())
}

/// A message in a stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum StoredMessage {
    User {
        content: String,
    },
    Assistant {
        stage1: Vec<Stage1Response>,
        stage2: Vec<Stage2Ranking>,
        stage3: Stage3Result,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub messages: Vec<StoredMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub message_count: usize,
}

/// Conversation persistence used by the orchestrator and the HTTP layer
pub trait ConversationStore: Send + Sync {
    fn create_conversation(&self, id: &str) -> Result<Conversation>;
    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    /// Newest first
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;
    fn add_user_message(&self, id: &str, content: &str) -> Result<()>;
    fn add_assistant_message(
        &self,
        id: &str,
        stage1: Vec<Stage1Response>,
        stage2: Vec<Stage2Ranking>,
        stage3: Stage3Result,
    ) -> Result<()>;
    fn update_title(&self, id: &str, title: &str) -> Result<()>;
}

/// One pretty-printed JSON file per conversation
pub struct JsonConversationStore {
    dir: PathBuf,
    /// Serialises read-modify-write cycles on conversation files
    write_lock: Mutex<()>,
}

impl JsonConversationStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join("conversations");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids become file names; keep them to a single path component
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("Invalid conversation id: {:?}", id);
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self.path_for(&conversation.id)?;
        let content = serde_json::to_string_pretty(conversation)?;
        write_private_file(&path, content.as_bytes())
    }

    fn update<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Conversation),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Conversation store lock poisoned"))?;
        let mut conversation = self
            .get_conversation(id)?
            .with_context(|| format!("Conversation {} not found", id))?;
        f(&mut conversation);
        self.save(&conversation)
    }
}

impl ConversationStore for JsonConversationStore {
    fn create_conversation(&self, id: &str) -> Result<Conversation> {
        let conversation = Conversation::new(id);
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Conversation store lock poisoned"))?;
        self.save(&conversation)?;
        tracing::debug!("Created conversation {}", id);
        Ok(conversation)
    }

    fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let conversation = serde_json::from_str(&content).context("Failed to parse conversation")?;
        Ok(Some(conversation))
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let mut conversations = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                match serde_json::from_str::<Conversation>(&content) {
                    Ok(conv) => conversations.push(ConversationSummary {
                        id: conv.id,
                        created_at: conv.created_at,
                        title: conv.title,
                        message_count: conv.messages.len(),
                    }),
                    Err(e) => tracing::warn!("Skipping unreadable conversation {:?}: {}", path, e),
                }
            }
        }

        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    fn add_user_message(&self, id: &str, content: &str) -> Result<()> {
        self.update(id, |conv| {
            conv.messages.push(StoredMessage::User {
                content: content.to_string(),
            })
        })
    }

    fn add_assistant_message(
        &self,
        id: &str,
        stage1: Vec<Stage1Response>,
        stage2: Vec<Stage2Ranking>,
        stage3: Stage3Result,
    ) -> Result<()> {
        self.update(id, |conv| {
            conv.messages.push(StoredMessage::Assistant {
                stage1,
                stage2,
                stage3,
            })
        })
    }

    fn update_title(&self, id: &str, title: &str) -> Result<()> {
        self.update(id, |conv| conv.title = title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, JsonConversationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConversationStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_dir, store) = store();
        let created = store.create_conversation("abc").unwrap();
        assert_eq!(created.title, DEFAULT_TITLE);

        let loaded = store.get_conversation("abc").unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(store.get_conversation("missing").unwrap().is_none());
    }

    #[test]
    fn test_messages_are_appended_in_order() {
        let (_dir, store) = store();
        store.create_conversation("c1").unwrap();
        store.add_user_message("c1", "What is Rust?").unwrap();
        store
            .add_assistant_message(
                "c1",
                vec![Stage1Response {
                    model: "copilot/gpt-4o".into(),
                    response: "A language".into(),
                }],
                vec![],
                Stage3Result {
                    model: "copilot/gpt-4o".into(),
                    response: "A systems language".into(),
                },
            )
            .unwrap();
        store.update_title("c1", "About Rust").unwrap();

        let conv = store.get_conversation("c1").unwrap().unwrap();
        assert_eq!(conv.title, "About Rust");
        assert_eq!(conv.messages.len(), 2);
        assert!(matches!(conv.messages[0], StoredMessage::User { .. }));
        assert!(matches!(conv.messages[1], StoredMessage::Assistant { .. }));
    }

    #[test]
    fn test_mutating_unknown_conversation_fails() {
        let (_dir, store) = store();
        assert!(store.add_user_message("nope", "hi").is_err());
        assert!(store.update_title("nope", "t").is_err());
    }

    #[test]
    fn test_path_traversal_is_rejected() {
        let (_dir, store) = store();
        assert!(store.get_conversation("../etc/passwd").is_err());
        assert!(store.create_conversation("").is_err());
    }

    #[test]
    fn test_list_newest_first() {
        let (_dir, store) = store();
        let mut old = Conversation::new("old");
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        store.save(&old).unwrap();
        store.create_conversation("new").unwrap();

        let list = store.list_conversations().unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_conversation_writes_are_atomic_and_private() {
        let (dir, store) = store();
        store.create_conversation("c2").unwrap();
        store.add_user_message("c2", "first").unwrap();
        store.update_title("c2", "Titled").unwrap();

        let conversations = dir.path().join("conversations");
        let names: Vec<String> = std::fs::read_dir(&conversations)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["c2.json".to_string()]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(conversations.join("c2.json"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_private_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("secret");
        write_private_file(&path, b"one").unwrap();
        write_private_file(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!dir.path().join("nested").join("secret.tmp").exists());
    }
}
