//! Preference storage adapters.

mod file_store;
mod memory_store;

pub use file_store::{FileKeyValueStore, to_json_stable};
pub use memory_store::InMemoryKeyValueStore;
