//! Persistence of editable request configurations.
//!
//! Configs are stored one per key (`postwhale_config_<id>`) as JSON in a
//! [`KeyValueStore`]. A config's snapshot is only replaced after the store
//! accepted the write, so a failed save leaves it dirty.

use postwhale_domain::{EditableConfig, SavedRequest, StoredConfig};

use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::{ActionInvoker, KeyValueStore, StoreError};
use crate::use_cases::worker_api::WorkerApi;

/// Key prefix of stored configs.
pub const CONFIG_KEY_PREFIX: &str = "postwhale_config_";

fn config_key(id: &str) -> String {
    format!("{CONFIG_KEY_PREFIX}{id}")
}

/// Repository for [`EditableConfig`]s.
#[derive(Debug, Clone)]
pub struct ConfigRepository<S> {
    store: S,
}

impl<S: KeyValueStore> ConfigRepository<S> {
    /// Creates a repository over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads a config. Corrupt entries are treated as missing.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn load(&self, id: &str) -> ApplicationResult<Option<EditableConfig>> {
        let Some(raw) = self.store.get(&config_key(id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredConfig>(&raw) {
            Ok(stored) => Ok(Some(EditableConfig::from_stored(stored))),
            Err(error) => {
                tracing::warn!(config_id = %id, %error, "Ignoring corrupt stored config");
                Ok(None)
            }
        }
    }

    /// Persists the config's current fields and marks it clean.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written; the
    /// config then stays dirty.
    pub async fn save(&self, config: &mut EditableConfig) -> ApplicationResult<()> {
        let raw = serde_json::to_string(&config.to_stored()).map_err(StoreError::from)?;
        self.store.set(&config_key(&config.id), &raw).await?;
        config.capture_snapshot();
        tracing::debug!(config_id = %config.id, "Config saved");
        Ok(())
    }

    /// Removes one stored config.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    pub async fn clear(&self, id: &str) -> ApplicationResult<()> {
        self.store.remove(&config_key(id)).await?;
        Ok(())
    }

    /// Removes every stored config and returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub async fn clear_all(&self) -> ApplicationResult<usize> {
        let keys: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(CONFIG_KEY_PREFIX))
            .collect();

        for key in &keys {
            self.store.remove(key).await?;
        }
        Ok(keys.len())
    }
}

/// Saves `config` as a named preset in the worker.
///
/// Anonymous configs are created as new presets and take the new id;
/// configs already backed by a preset overwrite it. The snapshot is
/// replaced only when the worker accepted the save.
///
/// # Errors
/// Returns an error if the fields cannot be encoded or the worker call fails.
pub async fn save_preset<I: ActionInvoker>(
    api: &WorkerApi<I>,
    config: &mut EditableConfig,
    name: &str,
) -> ApplicationResult<SavedRequest> {
    let fields = config
        .to_saved_request_fields(name)
        .map_err(StoreError::from)?;

    let saved = if config.is_saved_request() {
        let id = config
            .id
            .parse()
            .map_err(|_| ApplicationError::NotFound(format!("saved request {}", config.id)))?;
        api.update_saved_request(id, fields).await?
    } else {
        api.save_saved_request(fields).await?
    };

    config.id = saved.id.to_string();
    config.name = Some(saved.name.clone());
    config.capture_snapshot();
    Ok(saved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::BridgeError;
    use async_trait::async_trait;
    use postwhale_domain::Endpoint;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MapStore {
        values: Arc<Mutex<BTreeMap<String, String>>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Unavailable("quota exceeded".to_string()));
            }
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }
    }

    fn endpoint() -> Endpoint {
        serde_json::from_value(json!({
            "id": 4, "serviceId": 1, "method": "POST", "path": "/orders"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn save_then_load_round_trips_clean() {
        let store = MapStore::default();
        let repository = ConfigRepository::new(store.clone());
        let mut config = EditableConfig::anonymous(&endpoint());
        config.body = "{\"qty\":1}".to_string();
        assert!(config.is_dirty());

        repository.save(&mut config).await.unwrap();
        assert!(!config.is_dirty());
        assert!(store.values.lock().unwrap().contains_key("postwhale_config_temp_4"));

        let loaded = repository.load("temp_4").await.unwrap().unwrap();
        assert_eq!(loaded.body, "{\"qty\":1}");
        assert!(!loaded.is_dirty());
    }

    #[tokio::test]
    async fn failed_save_leaves_config_dirty() {
        let repository = ConfigRepository::new(MapStore {
            fail_writes: true,
            ..MapStore::default()
        });
        let mut config = EditableConfig::anonymous(&endpoint());
        config.body = "changed".to_string();

        let result = repository.save(&mut config).await;

        assert!(matches!(result, Err(ApplicationError::Store(_))));
        assert!(config.is_dirty());
    }

    #[tokio::test]
    async fn corrupt_entry_loads_as_none() {
        let store = MapStore::default();
        store
            .values
            .lock()
            .unwrap()
            .insert("postwhale_config_temp_4".to_string(), "{not json".to_string());

        let repository = ConfigRepository::new(store);

        assert_eq!(repository.load("temp_4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_all_only_touches_configs() {
        let store = MapStore::default();
        {
            let mut values = store.values.lock().unwrap();
            values.insert("postwhale_config_1".to_string(), "{}".to_string());
            values.insert("postwhale_config_temp_2".to_string(), "{}".to_string());
            values.insert("postwhale_favorites_repos".to_string(), "[]".to_string());
        }
        let repository = ConfigRepository::new(store.clone());

        assert_eq!(repository.clear_all().await.unwrap(), 2);
        assert_eq!(
            store.values.lock().unwrap().keys().cloned().collect::<Vec<_>>(),
            vec!["postwhale_favorites_repos".to_string()]
        );
    }

    struct PresetWorker;

    impl ActionInvoker for PresetWorker {
        async fn invoke(&self, action: &str, data: Value) -> Result<Value, BridgeError> {
            let mut saved = data;
            match action {
                "saveSavedRequest" => saved["id"] = json!(31),
                "updateSavedRequest" => {}
                other => return Err(BridgeError::RemoteError(format!("unknown action: {other}"))),
            }
            Ok(json!({"success": true, "data": saved}))
        }
    }

    #[tokio::test]
    async fn save_preset_adopts_new_id_and_cleans() {
        let api = WorkerApi::new(PresetWorker);
        let mut config = EditableConfig::anonymous(&endpoint());
        config.body = "{}".to_string();

        let saved = save_preset(&api, &mut config, "Create order").await.unwrap();

        assert_eq!(saved.id, 31);
        assert_eq!(config.id, "31");
        assert_eq!(config.name.as_deref(), Some("Create order"));
        assert!(config.is_saved_request());
        assert!(!config.is_dirty());

        config.body = "{\"qty\":2}".to_string();
        let updated = save_preset(&api, &mut config, "Create order").await.unwrap();
        assert_eq!(updated.id, 31);
        assert!(!config.is_dirty());
    }
}
