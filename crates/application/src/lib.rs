//! `PostWhale` Application - Use cases and ports
//!
//! This crate defines the application layer with:
//! - Port traits (interfaces for the worker bridge, preference storage and time)
//! - Use case orchestration (lifecycle tracking, typed worker calls, catalog loading)
//! - Application-level error handling

pub mod error;
pub mod ports;
pub mod use_cases;

pub use error::{ApplicationError, ApplicationResult};
pub use ports::{ActionInvoker, BridgeError, Clock, KeyValueStore, StoreError};
pub use use_cases::{
    Catalog, ConfigRepository, ExecuteRequestInput, FavoritesRepository, LifecycleEntry,
    RequestLifecycleStore, SendTicket, WorkerAction, WorkerApi, load_catalog, save_preset,
    summarize_errors,
};
