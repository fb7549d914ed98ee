pub mod file_cache;
pub mod models;

use crate::error::AppError;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

// ── Keys ──

pub const KEY_CONVERSATIONS: &str = "conversations";
pub const KEY_SOUND_ENABLED: &str = "sound_enabled";
pub const KEY_THEME: &str = "theme";
pub const KEY_SIDEBAR_OPEN: &str = "sidebar_open";
pub const KEY_FIRST_VISIT: &str = "first_visit";
pub const KEY_CURRENT_CHAT: &str = "current_chat";
pub const KEY_CACHED_FILES: &str = "cached_files";
pub const KEY_API_KEY: &str = "api_key";

pub fn history_key(conversation_id: &str) -> String {
    format!("chat_history:{}", conversation_id)
}

/// Key-value store with local-storage semantics: whole values are
/// overwritten on save, reads never fail loudly.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(app_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(app_dir).ok();
        let db_path = app_dir.join("urdu-gpt.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself intact.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
    }

    fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Load `key`, falling back to `T::default()`.
    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.load_or(key, T::default())
    }

    /// Load `key`, falling back to `default` when it is missing, unreadable
    /// or corrupted. Corrupted entries are removed.
    pub fn load_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err @ AppError::PersistenceCorruption { .. }) => {
                warn!(key, error = %err, "discarding corrupted entry");
                self.clear(key);
                default
            }
            Err(err) => {
                warn!(key, error = %err, "failed to read entry");
                default
            }
        }
    }

    fn try_load<T: DeserializeOwned>(&self, key: &str) -> std::result::Result<Option<T>, AppError> {
        let Some(raw) = self.read_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| AppError::PersistenceCorruption {
                key: key.to_string(),
                source,
            })
    }

    /// Overwrite `key` with `value`. Best effort: failures are logged.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize value");
                return;
            }
        };
        match self.write_raw(key, &json) {
            Ok(()) => debug!(key, bytes = json.len(), "saved"),
            Err(err) => warn!(key, error = %err, "failed to save value"),
        }
    }

    pub fn clear(&self, key: &str) {
        let conn = self.lock();
        if let Err(err) = conn.execute("DELETE FROM kv WHERE key = ?1", params![key]) {
            warn!(key, error = %err, "failed to clear key");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.read_raw(key), Ok(Some(_)))
    }

    /// Write a raw, unvalidated string. Used to seed fixtures.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &str) {
        self.write_raw(key, value).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_yields_default() {
        let store = Store::in_memory().unwrap();
        let value: Vec<String> = store.load("nothing");
        assert!(value.is_empty());
        assert!(store.load_or(KEY_SOUND_ENABLED, true));
    }

    #[test]
    fn save_overwrites_whole_value() {
        let store = Store::in_memory().unwrap();
        store.save("list", &vec![1, 2, 3]);
        store.save("list", &vec![4]);
        let value: Vec<i32> = store.load("list");
        assert_eq!(value, vec![4]);
    }

    #[test]
    fn corrupted_entry_is_discarded() {
        let store = Store::in_memory().unwrap();
        store.put_raw(KEY_CONVERSATIONS, "{not json");

        let value: Vec<String> = store.load(KEY_CONVERSATIONS);
        assert!(value.is_empty());
        assert!(!store.contains(KEY_CONVERSATIONS));
    }

    #[test]
    fn wrong_shape_counts_as_corruption() {
        let store = Store::in_memory().unwrap();
        store.put_raw(KEY_SOUND_ENABLED, "\"loud\"");
        assert!(store.load_or(KEY_SOUND_ENABLED, true));
        assert!(!store.contains(KEY_SOUND_ENABLED));
    }

    #[test]
    fn clear_removes_key() {
        let store = Store::in_memory().unwrap();
        store.save(KEY_THEME, "dark");
        assert!(store.contains(KEY_THEME));
        store.clear(KEY_THEME);
        store.clear(KEY_THEME);
        assert!(!store.contains(KEY_THEME));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::new(dir.path()).unwrap();
            store.save(KEY_CURRENT_CHAT, "abc");
        }
        let store = Store::new(dir.path()).unwrap();
        let current: Option<String> = store.load(KEY_CURRENT_CHAT);
        assert_eq!(current.as_deref(), Some("abc"));
    }
}
