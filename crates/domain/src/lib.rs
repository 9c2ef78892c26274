//! `PostWhale` Domain - Core types
//!
//! This crate defines the data model shared by the worker bridge and the
//! explorer front end: wire envelopes, catalog entities, editable request
//! configurations and tree visibility.
//! All types here are pure Rust with no I/O dependencies.

pub mod call;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod state;

pub use call::{CALL_ID_FIELD, CallEnvelope, CallId, ResponseEnvelope};
pub use catalog::{
    CheckPathResult, Endpoint, EndpointSpec, EntityId, Environment, HttpResponse, Parameter,
    ParameterLocation, Repository, RequestHistoryEntry, SavedRequest, ScanDirectoryResult,
    Service, SubdirInfo,
};
pub use config::{
    ConfigSnapshot, EditableConfig, KeyValueParam, PathParamError, ResolvedRequest,
    SavedRequestFields, StoredConfig,
};
pub use error::{DomainError, DomainResult};
pub use filter::{FilterCriteria, Favorites, ItemKind, ViewMode, VisibilitySets, filter_tree};
pub use state::{RequestErrorKind, RequestState};
