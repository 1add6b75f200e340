//! # Unitary
//!
//! A small cooperative runtime for identifiable, stateful, resumable units of work
//! whose actual execution is delegated to an external process engine.
//!
//! ## Features
//!
//! - **Explicit Lifecycle**: Every instance walks a ten-state machine with a fixed edge table
//! - **Cooperative Scheduling**: One current instance, a run-stack, no preemption
//! - **Ordered Signals**: Mail queued while suspended is delivered in order before running again
//! - **Cross-thread Resumption**: Engine completions may land from any thread
//! - **Guards**: Supervise other instances through plain ids, never owning them
//!
//! ## Quick Start
//!
//! ```rust
//! use unitary::prelude::*;
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl Unit for Hello {
//!     fn identity(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let engine = Arc::new(MemoryEngine::new());
//! engine.register(ProcessDefinition::new("hello"));
//!
//! let mut executor = UnitExecutor::new(engine);
//! let id = executor.run(Hello).unwrap();
//! assert_eq!(executor.instance(id).unwrap().state(), State::Completed);
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`]: the [`Engine`] collaborator trait and the in-memory [`MemoryEngine`]
//! - [`prelude`]: Commonly used types and traits (import with `use unitary::prelude::*`)

// ============================================================================
// Core Module
// ============================================================================

mod core;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

// Core types
pub use crate::core::{AsAny, InstanceId, UnitValue, Variables};

// Lifecycle
pub use crate::core::state::State;
pub use crate::core::unit::{Proto, Unit};
pub use crate::core::binding::{UnitBinding, VariableBinder};
pub use crate::core::instance::{InstanceKind, ProcessSession, UnitInstance};

// Scheduling and signals
pub use crate::core::executor::UnitExecutor;
pub use crate::core::scheduler::UnitScheduler;
pub use crate::core::signal::{
    InstanceSignal, Mailbox, SchedulerSignal, Signal, SignalSender, UnregisterGuard,
    WORK_ITEM_COMPLETED,
};

// Errors and configuration
pub use crate::core::config::{HaltPolicy, RuntimeConfig};
pub use crate::core::error::{EngineError, UnitError};

// ============================================================================
// Engine
// ============================================================================

/// The delegated execution engine and its in-memory reference implementation.
pub mod engine {
    pub use crate::core::engine::memory::{
        MemoryEngine, ProcessDefinition, ProcessState, Step, WorkItem,
    };
    pub use crate::core::engine::{Engine, EngineHandle, EventListener};
}

pub use engine::{Engine, EngineHandle, MemoryEngine, ProcessDefinition};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// The main prelude: imports everything you need to define and run units.
///
/// # Example
/// ```rust
/// use unitary::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        // Engine
        Engine,
        EngineError,
        EngineHandle,
        HaltPolicy,
        InstanceId,
        InstanceSignal,
        MemoryEngine,
        ProcessDefinition,
        Proto,
        RuntimeConfig,
        Signal,
        // Lifecycle
        State,
        Unit,
        UnitBinding,
        UnitError,
        // Running
        UnitExecutor,
        UnitInstance,
        UnitScheduler,
        UnitValue,
        Variables,
    };
}

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
