//! Error types used by the unit runtime.
//!
//! - [`UnitError`]: contract violations raised by instances and the scheduler.
//! - [`EngineError`]: failures reported by the delegated engine.
//!
//! A fault during a running step is not an error to the caller: it is
//! contained in the instance (see [`State::Faulted`]) and handed to the unit's
//! `on_fault` callback as an [`EngineError`].

use thiserror::Error;

use crate::core::engine::EngineHandle;
use crate::core::state::State;
use crate::core::InstanceId;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum UnitError {
    /// Attempted a transition that is not an edge of the lifecycle.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: State, to: State },

    /// An operation was invoked against a state that does not permit it.
    #[error("cannot {operation} an instance in state {state}")]
    IllegalOperation {
        operation: &'static str,
        state: State,
    },

    /// The instance kind does not implement this operation.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    #[error("no current instance")]
    NoCurrentInstance,

    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    #[error("no pending instance matches the insertion point")]
    InsertionPointNotFound,

    #[error("instance {0} is not a guard")]
    NotAGuard(InstanceId),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl UnitError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::IllegalTransition { .. } => "illegal_transition",
            UnitError::IllegalOperation { .. } => "illegal_operation",
            UnitError::Unsupported { .. } => "unsupported_operation",
            UnitError::NoCurrentInstance => "no_current_instance",
            UnitError::UnknownInstance(_) => "unknown_instance",
            UnitError::InsertionPointNotFound => "insertion_point_not_found",
            UnitError::NotAGuard(_) => "not_a_guard",
            UnitError::Engine(_) => "engine_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown engine handle {0}")]
    UnknownHandle(EngineHandle),

    #[error("unknown process definition: {0}")]
    UnknownProcess(String),

    /// Execution failed inside the engine.
    #[error("fault: {0}")]
    Fault(String),

    #[error("engine instance {0} is not active")]
    NotActive(EngineHandle),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = UnitError::IllegalTransition {
            from: State::Running,
            to: State::Created,
        };
        assert_eq!(err.as_label(), "illegal_transition");
        assert_eq!(err.to_string(), "illegal transition running -> created");
        assert_eq!(
            UnitError::Unsupported { operation: "yield" }.to_string(),
            "unsupported operation: yield"
        );
    }

    #[test]
    fn test_engine_error_converts() {
        let err: UnitError = EngineError::Fault("boom".into()).into();
        assert_eq!(err.as_label(), "engine_error");
        assert_eq!(err.to_string(), "engine error: fault: boom");
    }
}
