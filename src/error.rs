//! Error taxonomy for the build pipeline.

use thiserror::Error;

use crate::types::{IndexType, Uid};

/// Errors surfaced by pipeline stages, the orchestrator and the status subsystem.
///
/// Collaborator failures arrive as `anyhow::Error` and are flattened into the message with
/// `{:#}` so the whole cause chain survives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Wiring bug: missing next stage, zero batch size, reuse after destroy. Never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Caller bug detected at runtime (e.g. a history pattern of the wrong length).
    #[error("illegal state: {message}")]
    IllegalState { message: String },

    #[error("lookup failed for {index_type} uid {uid:?}: {message}")]
    Lookup {
        index_type: IndexType,
        uid: Option<Uid>,
        message: String,
    },

    #[error("document creation failed for {index_type} uid {uid}: {message}")]
    Transform {
        index_type: IndexType,
        uid: Uid,
        message: String,
    },

    #[error("publish failed for {index_type} uid {uid}: {message}")]
    Publish {
        index_type: IndexType,
        uid: Uid,
        message: String,
    },

    /// A stage task panicked; its item is dropped and counted as completed.
    #[error("{stage} task panicked on a {index_type} item: {message}")]
    Panicked {
        index_type: IndexType,
        stage: &'static str,
        message: String,
    },

    #[error("commit failed for {index_type}: {message}")]
    Commit {
        index_type: IndexType,
        message: String,
    },

    #[error("build status store error for {index_type}: {message}")]
    Store {
        index_type: IndexType,
        message: String,
    },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        PipelineError::IllegalState {
            message: message.into(),
        }
    }

    /// Fatal wiring errors that must abort the caller instead of being recorded per item.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration { .. })
    }

    /// Index type the error belongs to, when it is tied to one.
    pub fn index_type(&self) -> Option<IndexType> {
        match self {
            PipelineError::Lookup { index_type, .. }
            | PipelineError::Transform { index_type, .. }
            | PipelineError::Publish { index_type, .. }
            | PipelineError::Panicked { index_type, .. }
            | PipelineError::Commit { index_type, .. }
            | PipelineError::Store { index_type, .. } => Some(*index_type),
            PipelineError::Configuration { .. } | PipelineError::IllegalState { .. } => None,
        }
    }
}
