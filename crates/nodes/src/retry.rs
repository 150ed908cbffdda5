//! Generic retry / backoff / pause driver wrapped around every node service.
//!
//! 1. Input validation: a rejection is terminal and consumes no attempt.
//! 2. Status moves to `running`.
//! 3. Up to `1 + max_retries` attempts, sleeping
//!    `backoff_ms × multiplier^attempt` between them.
//! 4. Before each attempt (including the first) the driver waits on the
//!    pause gate, so a pause issued during a backoff holds the next attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, instrument, warn};

use crate::context::NodeContext;
use crate::models::{Node, NodeRunStatus};
use crate::pause::PauseGate;
use crate::traits::{NodeExecutionResult, NodeService};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-service retry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Wait on the pause gate before every attempt.
    pub pause_aware: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
            pause_aware: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay after the failed attempt with 0-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        // `as` saturates, so an absurd multiplier yields u64::MAX rather than wrapping.
        Duration::from_millis(millis.round() as u64)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run `service` for `node` with validation, retries and pause handling.
///
/// Status changes go through `ctx`; the returned result is the successful
/// attempt's result, or a failure carrying the last attempt's message.
#[instrument(skip_all, fields(node_id = %node.id, node_type = %node.node_type))]
pub async fn run_with_retry(
    service: &dyn NodeService,
    node: &Node,
    ctx: &NodeContext<'_>,
    config: &RetryConfig,
    gate: &PauseGate,
) -> NodeExecutionResult {
    if let Err(errors) = service.validate_inputs(node, ctx) {
        let message = format!("input validation failed: {}", errors.join(", "));
        warn!(error = %message, "node rejected before execution");
        ctx.update_status(&node.id, NodeRunStatus::Error);
        return NodeExecutionResult::failure(message);
    }

    ctx.update_status(&node.id, NodeRunStatus::Running);

    let mut last_error = String::new();
    for attempt in 0..=config.max_retries {
        if config.pause_aware {
            gate.wait_until_resumed().await;
        }

        match service.execute(node, ctx).await {
            Ok(result) if result.success => {
                ctx.update_status(&node.id, NodeRunStatus::Success);
                return result;
            }
            Ok(result) => {
                last_error = result
                    .error
                    .unwrap_or_else(|| "execution returned failure".to_owned());
            }
            Err(err) => last_error = err.to_string(),
        }

        if attempt < config.max_retries {
            let delay = config.delay(attempt);
            warn!(
                "node '{}' attempt {}/{} failed, retrying in {:?}: {}",
                node.id,
                attempt + 1,
                config.max_retries + 1,
                delay,
                last_error
            );
            tokio::time::sleep(delay).await;
        }
    }

    error!(
        "node '{}' still failing after {} retries: {}",
        node.id, config.max_retries, last_error
    );
    ctx.update_status(&node.id, NodeRunStatus::Error);
    NodeExecutionResult::failure(last_error)
}
