use std::sync::Arc;

use crate::core::config::RuntimeConfig;
use crate::core::engine::Engine;
use crate::core::error::UnitError;
use crate::core::instance::UnitInstance;
use crate::core::scheduler::UnitScheduler;
use crate::core::signal::{Signal, UnregisterGuard};
use crate::core::state::State;
use crate::core::unit::{Proto, Unit};
use crate::core::InstanceId;

/// Drives units through a [`UnitScheduler`] on top of an [`Engine`].
///
/// The executor is the single driver of its scheduler: every `run*` call
/// steps instances until the run-stack has nothing active left, then returns.
/// Instances that suspended stay registered and can be picked up again with
/// [`run_instance`](Self::run_instance) once something woke them up.
pub struct UnitExecutor {
    engine: Arc<dyn Engine>,
    scheduler: UnitScheduler,
    config: RuntimeConfig,
}

impl UnitExecutor {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_config(engine, RuntimeConfig::default())
    }

    pub fn with_config(engine: Arc<dyn Engine>, config: RuntimeConfig) -> Self {
        UnitExecutor {
            engine,
            scheduler: UnitScheduler::new(),
            config,
        }
    }

    /// Creates an instance of `unit`, runs it and returns its id.
    pub fn run<U: Unit>(&mut self, unit: U) -> Result<InstanceId, UnitError> {
        self.run_proto(Proto::new(unit))
    }

    pub fn run_proto(&mut self, proto: Proto) -> Result<InstanceId, UnitError> {
        let id = self.submit_proto(proto)?;
        self.drive()?;
        Ok(id)
    }

    /// Runs an existing instance again, typically after an external event woke it up.
    pub fn run_instance(&mut self, id: InstanceId) -> Result<InstanceId, UnitError> {
        self.scheduler.schedule(id)?;
        self.drive()?;
        Ok(id)
    }

    /// Creates and schedules an instance without running anything.
    pub fn submit<U: Unit>(&mut self, unit: U) -> Result<InstanceId, UnitError> {
        self.submit_proto(Proto::new(unit))
    }

    pub fn submit_proto(&mut self, proto: Proto) -> Result<InstanceId, UnitError> {
        let instance = UnitInstance::process(proto, Arc::clone(&self.engine), &self.config)?;
        let id = self.scheduler.register(instance);
        self.scheduler.schedule(id)?;
        Ok(id)
    }

    /// Registers a guard over `watched` and records it as a reference of
    /// every watched instance, so it runs when they are left by the scheduler.
    pub fn spawn_guard<U: Unit>(
        &mut self,
        unit: U,
        watched: impl IntoIterator<Item = InstanceId>,
    ) -> InstanceId {
        let guard = UnitInstance::guard(unit, watched, &self.config);
        let watched = guard.references().to_vec();
        let id = self.scheduler.register(guard);
        for w in watched {
            match self.scheduler.instance_mut(w) {
                Some(inst) => inst.add_reference(id),
                None => log::warn!("guard {} watches unknown instance {}", id, w),
            }
        }
        id
    }

    /// Steps instances until no active instance is left on the run-stack.
    ///
    /// Faults are contained in the instances; only contract violations
    /// bubble up. When an instance completes, guards referencing it are told
    /// the dependency is satisfied while it is still current.
    pub fn drive(&mut self) -> Result<(), UnitError> {
        while let Some(id) = self.scheduler.next() {
            let instance = self
                .scheduler
                .instance_mut(id)
                .ok_or(UnitError::UnknownInstance(id))?;
            match instance.state() {
                State::Created | State::Resuming => instance.step()?,
                state => {
                    log::trace!("instance {} is {}, nothing to step", id, state);
                    continue;
                }
            }
            if instance.state().is_terminal() && !instance.references().is_empty() {
                self.scheduler.signal(&UnregisterGuard::new(id))?;
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<InstanceId> {
        self.scheduler.current()
    }

    pub fn instance(&self, id: InstanceId) -> Option<&UnitInstance> {
        self.scheduler.instance(id)
    }

    /// Drops a finished instance from the registry.
    pub fn remove(&mut self, id: InstanceId) -> Option<UnitInstance> {
        self.scheduler.remove(id)
    }

    pub fn signal(&mut self, signal: Signal) -> Result<(), UnitError> {
        self.scheduler.dispatch(signal)
    }

    /// Halts the scheduler's current instance and releases the guards watching it.
    pub fn halt(&mut self) -> Result<(), UnitError> {
        self.scheduler.halt()
    }

    pub fn scheduler(&self) -> &UnitScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut UnitScheduler {
        &mut self.scheduler
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}
