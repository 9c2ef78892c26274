//! `PostWhale` Infrastructure - Adapters and implementations
//!
//! This crate provides the worker bridge (frame codec, correlation table,
//! process connection) and concrete implementations of the ports defined
//! in the application layer.

pub mod adapters;
pub mod bridge;
pub mod codec;
pub mod persistence;
pub mod settings;

pub use adapters::{FixedClock, SystemClock};
pub use bridge::{
    Bridge, BridgeOptions, CallOutcome, CorrelationTable, DEFAULT_CALL_TIMEOUT, StartError,
    WorkerCommand,
};
pub use codec::{DEFAULT_MAX_FRAME_BYTES, FrameCodec, FrameDecodeError, decode_frame};
pub use persistence::{FileKeyValueStore, InMemoryKeyValueStore, to_json_stable};
pub use settings::{Settings, SettingsError};
