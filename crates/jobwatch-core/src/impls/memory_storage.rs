//! InMemoryStorage - テスト・一時実行用の RecordStorage

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::TrackerError;
use crate::ports::RecordStorage;

/// Keeps every saved value in a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    values: Mutex<HashMap<String, String>>,
    saves: Mutex<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key, as if a previous process had saved it.
    pub async fn insert(&self, key: &str, value: impl Into<String>) {
        self.values.lock().await.insert(key.to_string(), value.into());
    }

    /// Number of `save` calls so far.
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl RecordStorage for InMemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, TrackerError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), TrackerError> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        *self.saves.lock().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load("k").await.unwrap(), None);

        storage.save("k", "{}").await.unwrap();

        assert_eq!(storage.load("k").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(storage.save_count().await, 1);
    }
}
