//! The delegated execution engine.
//!
//! The runtime never executes a unit's work itself. It asks an [`Engine`] to
//! create an engine-side instance, start, resume or abort it, and to report
//! whether it is still active. Everything else about the engine is opaque.

pub mod memory;

use std::fmt;

use crate::core::error::EngineError;
use crate::core::{UnitValue, Variables};

/// Opaque handle to an engine-side instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback the engine invokes with `(event, payload)` for an instance.
///
/// It may be called from whichever thread completes the external work.
pub type EventListener = Box<dyn Fn(&str, UnitValue) + Send + Sync>;

/// Process/session primitives the runtime consumes.
///
/// `start` and `resume` run until the engine-side instance either completes
/// or waits on something external. An `Err` from either is treated as a fault
/// of the running step. Use [`is_active`](Engine::is_active) afterwards to tell
/// a pause (still active) from completion.
pub trait Engine: Send + Sync {
    /// Creates an engine-side instance of `identity` with initial variables.
    fn create_instance(
        &self,
        identity: &str,
        variables: Variables,
    ) -> Result<EngineHandle, EngineError>;

    fn start(&self, handle: EngineHandle) -> Result<(), EngineError>;

    fn resume(&self, handle: EngineHandle) -> Result<(), EngineError>;

    fn abort(&self, handle: EngineHandle) -> Result<(), EngineError>;

    /// Delivers a named external event to the instance.
    fn signal_event(
        &self,
        handle: EngineHandle,
        event: &str,
        payload: UnitValue,
    ) -> Result<(), EngineError>;

    fn is_active(&self, handle: EngineHandle) -> bool;

    fn variables(&self, handle: EngineHandle) -> Result<Variables, EngineError>;

    fn set_variables(&self, handle: EngineHandle, variables: Variables)
    -> Result<(), EngineError>;

    /// Registers a listener for events the engine raises about `handle`.
    fn subscribe(&self, handle: EngineHandle, listener: EventListener) -> Result<(), EngineError>;
}
