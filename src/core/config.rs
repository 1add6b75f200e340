//! Runtime configuration.
//!
//! [`RuntimeConfig`] is handed to the [`UnitExecutor`](crate::core::executor::UnitExecutor)
//! and copied into every instance it creates.

/// What `halt()` does on an instance that already reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltPolicy {
    /// Halting a completed instance is a no-op.
    #[default]
    Ignore,
    /// Halting a completed instance fails with an illegal transition.
    Reject,
}

/// Settings for the unit runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Behaviour of `halt()` on terminal instances.
    pub halt_policy: HaltPolicy,
}

impl RuntimeConfig {
    pub fn with_halt_policy(mut self, policy: HaltPolicy) -> Self {
        self.halt_policy = policy;
        self
    }
}
