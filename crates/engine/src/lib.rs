//! `engine` crate: topology, connection validation, and the pipeline
//! execution engine.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod state;
pub mod topology;
pub mod validator;

pub use error::{ConnectionError, EngineError};
pub use models::Workflow;
pub use pipeline::{EngineConfig, PipelineEngine};
pub use state::{FailureRecord, RunState, RunStatus, CYCLE_FAILURE_KEY};
pub use topology::{build_layers, validate_graph};
pub use validator::{is_port_compatible, validate_connection, ConnectionValidator, PortCompatibility};

#[cfg(test)]
mod pipeline_tests;
