use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use qrotate_application::RotationStateRepository;
use qrotate_core::AppResult;
use qrotate_domain::{RotationKey, RotationState};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct RotationStateEntry {
    state: RotationState,
    expires_at: Instant,
}

/// In-memory cache adapter for rotation liveness records.
#[derive(Default)]
pub struct InMemoryRotationStateRepository {
    entries: RwLock<HashMap<RotationKey, RotationStateEntry>>,
}

impl InMemoryRotationStateRepository {
    /// Creates an empty in-memory rotation state cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RotationStateRepository for InMemoryRotationStateRepository {
    async fn find_state(&self, key: &RotationKey) -> AppResult<Option<RotationState>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.state.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }

        Ok(None)
    }

    async fn compare_and_swap_state(
        &self,
        key: &RotationKey,
        expected_revision: Option<u64>,
        next: Option<&RotationState>,
        ttl_seconds: u32,
    ) -> AppResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);

        if entries.get(key).map(|entry| entry.state.revision) != expected_revision {
            return Ok(false);
        }

        match next {
            Some(state) if ttl_seconds > 0 => {
                let expires_at = now
                    .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
                    .unwrap_or(now);
                entries.insert(
                    key.clone(),
                    RotationStateEntry {
                        state: state.clone(),
                        expires_at,
                    },
                );
            }
            _ => {
                entries.remove(key);
            }
        }

        Ok(true)
    }

    async fn clear_state(&self, key: &RotationKey) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
