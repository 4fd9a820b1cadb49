//! Workflow engine client contract.
//!
//! Abstracts the durable-workflow engine so the canceller depends only on the
//! `WorkflowEngineClient` trait. Deadlines are enforced by the caller: a
//! request whose future is dropped is considered abandoned.

use async_trait::async_trait;

/// Acknowledgement returned by the engine once a request has taken effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineAck {
    /// Resources the engine reports as released, in the order it freed them.
    pub resources_freed: Vec<String>,
}

impl EngineAck {
    /// Acknowledgement without any reported resources.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Acknowledgement listing released resources.
    #[must_use]
    pub fn with_resources<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources_freed: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Errors reported by the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine has no execution with this identifier.
    #[error("workflow not found: {0}")]
    NotFound(String),
    /// The engine refused the request.
    #[error("workflow engine rejected request: {0}")]
    Rejected(String),
    /// The engine could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Contract for talking to the durable-workflow engine.
#[async_trait]
pub trait WorkflowEngineClient: Send + Sync {
    /// Asks the workflow to stop cooperatively and resolves once the engine
    /// acknowledges the request.
    async fn request_cancel(&self, workflow_id: &str) -> Result<EngineAck, EngineError>;

    /// Terminates the workflow immediately.
    async fn terminate(&self, workflow_id: &str, reason: &str) -> Result<EngineAck, EngineError>;
}
