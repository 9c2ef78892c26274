//! Application use cases (business logic orchestration).

mod catalog_loader;
mod config_repository;
mod favorites;
mod request_lifecycle;
mod worker_api;

pub use catalog_loader::{Catalog, load_catalog, summarize_errors};
pub use config_repository::{CONFIG_KEY_PREFIX, ConfigRepository, save_preset};
pub use favorites::FavoritesRepository;
pub use request_lifecycle::{LifecycleEntry, RequestLifecycleStore, SendTicket};
pub use worker_api::{
    ExecuteRequestInput, RefreshSummary, UpdateSavedRequestInput, WorkerAction, WorkerApi,
};
