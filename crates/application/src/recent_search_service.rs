//! Recent search ports and application service.
//!
//! Keeps the last few distinct search terms of one client in a local
//! key-value storage, the way a browser keeps them in `localStorage`.

use std::sync::Arc;

use async_trait::async_trait;

use qrotate_core::{AppError, AppResult};
use qrotate_domain::RecentSearches;

/// Storage key holding the JSON-encoded list.
pub const RECENT_SEARCH_STORAGE_KEY: &str = "recent_searches";

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Client-local string storage port.
#[async_trait]
pub trait RecentSearchStorage: Send + Sync {
    /// Returns the stored value for a key.
    async fn get_item(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a value under a key.
    async fn set_item(&self, key: &str, value: &str) -> AppResult<()>;

    /// Removes a key.
    async fn remove_item(&self, key: &str) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// One clickable entry of the rendered recent-search list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentSearchChip {
    /// Position in the list, most recent first.
    pub position: usize,
    /// Search term shown on the chip.
    pub label: String,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Application service for the recent-search list.
#[derive(Clone)]
pub struct RecentSearchService {
    storage: Arc<dyn RecentSearchStorage>,
}

impl RecentSearchService {
    /// Creates a new recent-search service.
    #[must_use]
    pub fn new(storage: Arc<dyn RecentSearchStorage>) -> Self {
        Self { storage }
    }

    /// Loads the persisted list.
    pub async fn load(&self) -> AppResult<RecentSearches> {
        Ok(self
            .storage
            .get_item(RECENT_SEARCH_STORAGE_KEY)
            .await?
            .map(|value| RecentSearches::from_json(value.as_str()))
            .unwrap_or_default())
    }

    /// Remembers a term, persists the list and returns the re-rendered chips.
    pub async fn add_recent(&self, term: &str) -> AppResult<Vec<RecentSearchChip>> {
        let mut searches = self.load().await?;
        if searches.add(term) {
            let encoded = searches.to_json()?;
            self.storage
                .set_item(RECENT_SEARCH_STORAGE_KEY, encoded.as_str())
                .await?;
        }

        Ok(render(&searches))
    }

    /// Forgets every term and removes the persisted key.
    pub async fn clear_recent(&self) -> AppResult<()> {
        self.storage.remove_item(RECENT_SEARCH_STORAGE_KEY).await
    }

    /// Renders one chip per remembered term.
    pub async fn render(&self) -> AppResult<Vec<RecentSearchChip>> {
        Ok(render(&self.load().await?))
    }

    /// Returns the term behind a clicked chip so the search can be re-issued.
    pub async fn select(&self, position: usize) -> AppResult<String> {
        self.load()
            .await?
            .get(position)
            .map(str::to_owned)
            .ok_or_else(|| {
                AppError::NotFound(format!("no recent search at position {position}"))
            })
    }
}

fn render(searches: &RecentSearches) -> Vec<RecentSearchChip> {
    searches
        .terms()
        .iter()
        .enumerate()
        .map(|(position, term)| RecentSearchChip {
            position,
            label: term.clone(),
        })
        .collect()
}
