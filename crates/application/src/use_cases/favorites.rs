//! Starred repositories, services and endpoints.

use std::collections::BTreeSet;

use postwhale_domain::{EntityId, Favorites, ItemKind};

use crate::error::ApplicationResult;
use crate::ports::{KeyValueStore, StoreError};

const REPOS_KEY: &str = "postwhale_favorites_repos";
const SERVICES_KEY: &str = "postwhale_favorites_services";
const ENDPOINTS_KEY: &str = "postwhale_favorites_endpoints";

const fn key_for(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Repository => REPOS_KEY,
        ItemKind::Service => SERVICES_KEY,
        ItemKind::Endpoint => ENDPOINTS_KEY,
    }
}

/// Repository for [`Favorites`], one JSON id array per level.
#[derive(Debug, Clone)]
pub struct FavoritesRepository<S> {
    store: S,
}

impl<S: KeyValueStore> FavoritesRepository<S> {
    /// Creates a repository over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads all three levels. Missing or unreadable arrays are empty.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn load(&self) -> ApplicationResult<Favorites> {
        Ok(Favorites {
            repos: self.load_level(ItemKind::Repository).await?,
            services: self.load_level(ItemKind::Service).await?,
            endpoints: self.load_level(ItemKind::Endpoint).await?,
        })
    }

    async fn load_level(&self, kind: ItemKind) -> ApplicationResult<BTreeSet<EntityId>> {
        let key = key_for(kind);
        let Some(raw) = self.store.get(key).await? else {
            return Ok(BTreeSet::new());
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!(key, %error, "Ignoring corrupt favorites");
            BTreeSet::new()
        }))
    }

    /// Persists all three levels.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    pub async fn save(&self, favorites: &Favorites) -> ApplicationResult<()> {
        self.save_level(ItemKind::Repository, &favorites.repos).await?;
        self.save_level(ItemKind::Service, &favorites.services).await?;
        self.save_level(ItemKind::Endpoint, &favorites.endpoints).await
    }

    async fn save_level(&self, kind: ItemKind, ids: &BTreeSet<EntityId>) -> ApplicationResult<()> {
        let raw = serde_json::to_string(ids).map_err(StoreError::from)?;
        self.store.set(key_for(kind), &raw).await?;
        Ok(())
    }

    /// Flips the starred state of one item and persists that level.
    ///
    /// Returns whether the item is starred afterwards.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub async fn toggle(&self, kind: ItemKind, id: EntityId) -> ApplicationResult<bool> {
        let mut ids = self.load_level(kind).await?;
        let starred = if ids.remove(&id) {
            false
        } else {
            ids.insert(id);
            true
        };
        self.save_level(kind, &ids).await?;
        Ok(starred)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MapStore(Arc<Mutex<HashMap<String, String>>>);

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.0.lock().unwrap().keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn empty_store_has_no_favorites() {
        let repository = FavoritesRepository::new(MapStore::default());
        assert!(repository.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = MapStore::default();
        let repository = FavoritesRepository::new(store.clone());

        assert!(repository.toggle(ItemKind::Service, 10).await.unwrap());
        assert_eq!(
            store.0.lock().unwrap().get(SERVICES_KEY).map(String::as_str),
            Some("[10]")
        );
        assert!(!repository.toggle(ItemKind::Service, 10).await.unwrap());
        assert!(repository.load().await.unwrap().services.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let repository = FavoritesRepository::new(MapStore::default());
        let favorites = Favorites {
            repos: [1].into(),
            services: BTreeSet::new(),
            endpoints: [100, 200].into(),
        };

        repository.save(&favorites).await.unwrap();

        assert_eq!(repository.load().await.unwrap(), favorites);
    }

    #[tokio::test]
    async fn corrupt_level_is_empty() {
        let store = MapStore::default();
        store
            .0
            .lock()
            .unwrap()
            .insert(ENDPOINTS_KEY.to_string(), "oops".to_string());
        store
            .0
            .lock()
            .unwrap()
            .insert(REPOS_KEY.to_string(), "[3]".to_string());

        let favorites = FavoritesRepository::new(store).load().await.unwrap();

        assert!(favorites.endpoints.is_empty());
        assert_eq!(favorites.repos, [3].into());
    }
}
