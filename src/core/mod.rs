//! Core of the unit runtime.
//!
//! - [`state`]: the ten-state lifecycle and its legal edges
//! - [`unit`]: the [`Unit`](unit::Unit) descriptor trait and [`Proto`](unit::Proto)
//! - [`binding`]: copying unit fields in and out of the engine
//! - [`signal`]: instance and scheduler signals, mailboxes, guard routing
//! - [`engine`]: the delegated execution engine and an in-memory implementation
//! - [`instance`]: the running [`UnitInstance`](instance::UnitInstance)
//! - [`scheduler`]: the cooperative run-stack
//! - [`executor`]: the driver loop tying scheduler and engine together

pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod instance;
pub mod scheduler;
pub mod signal;
pub mod state;
pub mod unit;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

/// The Alias for serde_json::Value, used for variables and signal payloads
pub type UnitValue = serde_json::Value;

/// A named set of variables, as exchanged with the engine.
pub type Variables = HashMap<String, UnitValue>;

/// A helper trait that just provides the `as_any` method.
/// Needed for downcasting a `dyn Unit` back to its concrete type in bindings.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Identifies a [`UnitInstance`](instance::UnitInstance) inside a scheduler's registry.
///
/// This is the only thing references and guards hold on to, so dropping one
/// never affects the instance it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        InstanceId(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the short form is plenty for logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}
