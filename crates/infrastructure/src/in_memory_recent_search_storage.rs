use std::collections::HashMap;

use async_trait::async_trait;
use qrotate_application::RecentSearchStorage;
use qrotate_core::AppResult;
use tokio::sync::RwLock;

/// In-memory key-value storage for one client's recent searches.
#[derive(Default)]
pub struct InMemoryRecentSearchStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryRecentSearchStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecentSearchStorage for InMemoryRecentSearchStorage {
    async fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        self.items
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> AppResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
