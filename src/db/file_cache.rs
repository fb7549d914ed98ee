use super::models::{CachedFile, NewCachedFile};
use super::{Store, KEY_CACHED_FILES};
use crate::clock::Clock;
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::info;

/// Cached uploads are evicted once they are this old.
pub const RETENTION_DAYS: i64 = 7;

/// Uploaded-file cache persisted under a single key. Expired entries are
/// dropped lazily whenever the cache is read.
pub struct FileCache {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl FileCache {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn retention() -> TimeDelta {
        TimeDelta::days(RETENTION_DAYS)
    }

    /// Current, unexpired entries in upload order.
    pub fn cached_files(&self) -> Vec<CachedFile> {
        let stored: Vec<CachedFile> = self.store.load(KEY_CACHED_FILES);
        let now = self.clock.now();
        let total = stored.len();
        let valid: Vec<CachedFile> = stored
            .into_iter()
            .filter(|file| now - file.timestamp < Self::retention())
            .collect();

        if valid.len() != total {
            info!(evicted = total - valid.len(), "evicted expired cached files");
            self.store.save(KEY_CACHED_FILES, &valid);
        }
        valid
    }

    pub fn cache_file(&self, meta: NewCachedFile) -> String {
        let file = CachedFile {
            id: format!("file_{}", uuid::Uuid::new_v4().simple()),
            name: meta.name,
            mime_type: meta.mime_type,
            size: meta.size,
            content: meta.content,
            timestamp: self.clock.now(),
        };
        let id = file.id.clone();

        let mut files = self.cached_files();
        files.push(file);
        self.store.save(KEY_CACHED_FILES, &files);
        id
    }

    pub fn get_file(&self, id: &str) -> Option<CachedFile> {
        self.cached_files().into_iter().find(|file| file.id == id)
    }

    /// Returns whether an entry was removed.
    pub fn remove_file(&self, id: &str) -> bool {
        let mut files = self.cached_files();
        let before = files.len();
        files.retain(|file| file.id != id);
        self.store.save(KEY_CACHED_FILES, &files);
        files.len() != before
    }

    pub fn clear_cache(&self) {
        self.store.clear(KEY_CACHED_FILES);
    }
}
