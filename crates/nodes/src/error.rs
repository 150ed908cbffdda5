//! Node-level error type.

use thiserror::Error;

/// Errors raised from a node service's `execute` method.
///
/// The retry driver treats every variant the same way as a returned failure:
/// the attempt is retried while attempts remain.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    /// An upstream node did not publish the value this node needs.
    #[error("missing upstream input on port '{0}'")]
    MissingInput(String),

    /// The node's data payload does not match the service's schema.
    #[error("invalid node data: {0}")]
    InvalidData(#[from] serde_json::Error),
}
