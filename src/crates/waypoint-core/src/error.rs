//! Error types for graph construction and execution

use crate::llm::ModelError;
use crate::store::StoreError;
use thiserror::Error;
use waypoint_checkpoint::CheckpointError;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building or running a workflow graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// The graph structure is invalid (caught at compile time)
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A run hit a route, node, goto target or tool name the graph does not know
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A known tool was called with arguments that do not fit it
    #[error("Invalid arguments for {tool}: {error}")]
    InvalidToolArguments { tool: String, error: String },

    /// Input rejected before any state was touched
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A node failed
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// `resume` was called on a thread that is not suspended
    #[error("Nothing to resume for thread '{thread_id}'")]
    NothingToResume { thread_id: String },

    /// A response type the interrupt request does not allow
    #[error("Response '{response}' is not permitted for action '{action}'")]
    ResponseNotPermitted { action: String, response: String },

    /// Number of responses differs from the number of pending requests
    #[error("Thread '{thread_id}' has {expected} pending interrupt(s) but {actual} response(s) were given")]
    ResponseCountMismatch {
        thread_id: String,
        expected: usize,
        actual: usize,
    },

    /// A run took more steps than the recursion limit allows
    #[error("Recursion limit of {limit} steps reached without reaching the end node")]
    RecursionLimit { limit: usize },

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Memory store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Model failed permanently
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_tool_arguments(tool: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::InvalidToolArguments {
            tool: tool.into(),
            error: error.to_string(),
        }
    }

    /// Errors raised before any state mutation; the thread is unchanged
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::NothingToResume { .. }
                | Self::ResponseNotPermitted { .. }
                | Self::ResponseCountMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_tool_arguments_are_not_rejections() {
        let err = GraphError::invalid_tool_arguments("send_email_tool", "missing field `email_id`");
        assert!(!err.is_rejection());
        assert_eq!(
            err.to_string(),
            "Invalid arguments for send_email_tool: missing field `email_id`"
        );
        assert!(GraphError::InvalidInput("empty".into()).is_rejection());
    }
}
