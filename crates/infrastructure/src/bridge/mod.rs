//! Request/response bridge to the worker process.

mod connection;
mod correlation;

pub use connection::{
    Bridge, BridgeOptions, DEFAULT_CALL_TIMEOUT, StartError, WorkerCommand,
};
pub use correlation::{CallOutcome, CompletionHandle, CorrelationTable};
