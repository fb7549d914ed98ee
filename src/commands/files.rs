use super::ChatApp;
use crate::db::models::{CachedFile, Media, MediaKind};
use crate::doc_processor;
use crate::error::AppError;
use std::path::Path;
use tracing::info;

impl ChatApp {
    /// Extract and cache an uploaded file, staging its content for the
    /// next prompt.
    pub fn upload_file(&mut self, path: &Path) -> Result<CachedFile, AppError> {
        let parsed = doc_processor::parse_file(path)?;
        let id = self.files.cache_file(parsed);
        let file = self
            .files
            .get_file(&id)
            .ok_or_else(|| AppError::FileNotFound(id.clone()))?;
        info!(id = %file.id, name = %file.name, size = file.size, "cached upload");
        self.staged_context = Some(file.content.clone());
        Ok(file)
    }

    /// Stage an image or audio file to be sent inline with the next prompt.
    pub fn attach_media(&mut self, path: &Path) -> Result<MediaKind, AppError> {
        let mime_type = doc_processor::mime_type_for(path);
        let kind = MediaKind::from_mime(mime_type)
            .ok_or_else(|| AppError::UnsupportedFile(path.display().to_string()))?;
        crate::db::models::check_media_size(std::fs::metadata(path)?.len() as usize)?;
        let bytes = std::fs::read(path)?;
        self.staged_media = Some(Media::from_bytes(kind, mime_type, &bytes)?);
        Ok(kind)
    }

    pub fn list_files(&self) -> Vec<CachedFile> {
        self.files.cached_files()
    }

    /// Stage a previously cached file's content for the next prompt.
    pub fn use_file(&mut self, id: &str) -> Result<CachedFile, AppError> {
        let file = self
            .files
            .get_file(id)
            .ok_or_else(|| AppError::FileNotFound(id.to_string()))?;
        self.staged_context = Some(file.content.clone());
        Ok(file)
    }

    pub fn remove_file(&mut self, id: &str) -> Result<(), AppError> {
        if self.files.remove_file(id) {
            Ok(())
        } else {
            Err(AppError::FileNotFound(id.to_string()))
        }
    }

    pub fn clear_files(&mut self) {
        self.files.clear_cache();
    }

    /// Drop any staged attachment or file content.
    pub fn discard_staged(&mut self) {
        self.staged_media = None;
        self.staged_context = None;
    }
}
