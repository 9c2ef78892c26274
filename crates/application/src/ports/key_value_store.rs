//! Key-value store port
//!
//! Opaque `key -> JSON string` persistence for editor preferences.

use std::sync::Arc;

use async_trait::async_trait;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backend refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Repository trait for string values keyed by name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the value cannot be persisted.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes a value. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists all keys.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys().await
    }
}
