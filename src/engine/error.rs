//! Error types for engine operations.

use super::types::TaskStatus;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the resolver, instantiator, workflow builder and
/// progression engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// An unknown template, task, event or department id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// A human-readable key (`department:title`) matched nothing.
    #[error("no template or department matches '{key}'")]
    UnknownKey { key: String },

    /// The prerequisite graph contains (or would contain) a directed cycle.
    #[error("cycle detected in prerequisite graph: {path}")]
    CycleDetected { path: String },

    /// A template was asked to require itself.
    #[error("template {template_id} cannot require itself")]
    SelfPrerequisite { template_id: i64 },

    /// An illegal status change.
    #[error("cannot move task {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: i64,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Workflows were already built for this event.
    #[error("workflows already built for event {event_id}")]
    AlreadyBuilt { event_id: i64 },

    #[error("database operation failed")]
    Database(#[from] rusqlite::Error),

    #[error("json encoding failed")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    #[must_use]
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn cycle(path: impl Into<String>) -> Self {
        Self::CycleDetected { path: path.into() }
    }

    /// Renders a sequence of ids as `a -> b -> c`.
    #[must_use]
    pub fn cycle_from_ids(ids: &[i64]) -> Self {
        let path = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        Self::cycle(path)
    }
}
