//! File-backed storage for the recent-search list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use qrotate_application::RecentSearchStorage;
use qrotate_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::warn;

/// Persists items as one JSON object in a file.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so readers never observe a partially written document.
pub struct JsonFileRecentSearchStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRecentSearchStorage {
    /// Creates storage backed by the given file; the file is created lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn read_items(&self) -> AppResult<BTreeMap<String, String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(error) => {
                return Err(AppError::Internal(format!(
                    "failed to read recent search storage '{}': {error}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_str(contents.as_str()) {
            Ok(items) => Ok(items),
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "ignoring malformed recent search storage file"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write_items(&self, items: &BTreeMap<String, String>) -> AppResult<()> {
        let encoded = serde_json::to_string_pretty(items).map_err(|error| {
            AppError::Internal(format!("failed to encode recent search storage: {error}"))
        })?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to create recent search storage directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        let temporary = self.path.with_extension("json.tmp");
        tokio::fs::write(&temporary, encoded).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to write recent search storage '{}': {error}",
                temporary.display()
            ))
        })?;

        tokio::fs::rename(&temporary, &self.path)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to replace recent search storage '{}': {error}",
                    self.path.display()
                ))
            })
    }
}

#[async_trait]
impl RecentSearchStorage for JsonFileRecentSearchStorage {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.read_items().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_items().await?;
        items.insert(key.to_owned(), value.to_owned());
        self.write_items(&items).await
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_items().await?;
        if items.remove(key).is_none() {
            return Ok(());
        }

        self.write_items(&items).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use qrotate_application::{RecentSearchService, RecentSearchStorage};

    use super::JsonFileRecentSearchStorage;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("qrotate-recent-{}", uuid::Uuid::new_v4()))
            .join("storage.json")
    }

    #[tokio::test]
    async fn items_survive_a_new_storage_instance() {
        let path = temp_path();
        let storage = JsonFileRecentSearchStorage::new(path.clone());
        assert!(storage.set_item("recent_searches", "[\"acme\"]").await.is_ok());

        let reopened = JsonFileRecentSearchStorage::new(path.clone());
        let value = reopened.get_item("recent_searches").await;
        assert_eq!(value.ok().flatten(), Some("[\"acme\"]".to_owned()));

        assert!(reopened.remove_item("recent_searches").await.is_ok());
        let value = reopened.get_item("recent_searches").await;
        assert!(matches!(value, Ok(None)));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap_or(path.as_path())).await;
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let storage = JsonFileRecentSearchStorage::new(temp_path());
        let value = storage.get_item("recent_searches").await;
        assert!(matches!(value, Ok(None)));
    }

    #[tokio::test]
    async fn malformed_file_reads_as_empty_list() {
        let path = temp_path();
        if let Some(parent) = path.parent() {
            assert!(tokio::fs::create_dir_all(parent).await.is_ok());
        }
        assert!(tokio::fs::write(&path, "not json").await.is_ok());

        let service = RecentSearchService::new(Arc::new(JsonFileRecentSearchStorage::new(
            path.clone(),
        )));
        let chips = service.render().await;
        assert_eq!(chips.ok().map(|chips| chips.len()), Some(0));

        let chips = service.add_recent("acme").await;
        assert_eq!(chips.ok().map(|chips| chips.len()), Some(1));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap_or(path.as_path())).await;
    }
}
