//! `nodes` crate: the node-service contract and built-in node services.
//!
//! Every node type is a [`NodeService`]. The engine crate looks services up in
//! a [`ServiceRegistry`] and drives them through [`run_with_retry`].

pub mod builtin;
pub mod context;
pub mod error;
pub mod mock;
pub mod models;
pub mod pause;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod traits;

pub use context::{ExecutionContext, MemoryContext, NodeContext};
pub use error::NodeError;
pub use models::{Connection, Node, NodeRunStatus, DEFAULT_PORT};
pub use pause::PauseGate;
pub use ports::{PortSchema, PortType};
pub use registry::ServiceRegistry;
pub use retry::{run_with_retry, RetryConfig};
pub use traits::{NodeExecutionResult, NodeService};
