use std::fmt;
use std::sync::Arc;

use crate::core::binding::VariableBinder;
use crate::core::config::{HaltPolicy, RuntimeConfig};
use crate::core::engine::{Engine, EngineHandle};
use crate::core::error::{EngineError, UnitError};
use crate::core::signal::{InstanceSignal, Mailbox, SignalSender};
use crate::core::state::State;
use crate::core::unit::{Proto, Unit};
use crate::core::InstanceId;

/// Link between an instance and its engine-side counterpart.
pub struct ProcessSession {
    engine: Arc<dyn Engine>,
    handle: EngineHandle,
    binder: VariableBinder,
}

impl ProcessSession {
    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    /// Pushes the unit's bound fields into the engine-side variables, so
    /// changes made by the unit since creation are seen by the first step.
    fn copy_bindings_in(&self, unit: &dyn Unit) -> Result<(), EngineError> {
        if self.binder.is_empty() {
            return Ok(());
        }
        self.engine.set_variables(self.handle, self.binder.as_map(unit))
    }
}

/// The behaviours an instance can have.
pub enum InstanceKind {
    /// Work is delegated to an engine-side process.
    Process(ProcessSession),
    /// Supervises other instances; its references are its watch-set.
    Guard,
}

/// The running incarnation of a [`Unit`].
///
/// An instance owns its unit, its lifecycle [`State`], a [`Mailbox`] of
/// pending signals and an ordered list of references to other instances.
/// References are plain ids: they never keep the referenced instance alive.
pub struct UnitInstance {
    id: InstanceId,
    unit: Box<dyn Unit>,
    kind: InstanceKind,
    state: State,
    history: Vec<State>,
    mailbox: Mailbox,
    references: Vec<InstanceId>,
    halt_policy: HaltPolicy,
}

impl UnitInstance {
    /// Creates an engine-backed instance.
    ///
    /// The proto's bindings are read from the unit and become the engine-side
    /// instance's initial variables. The engine's event listener feeds this
    /// instance's mailbox.
    pub fn process(
        proto: Proto,
        engine: Arc<dyn Engine>,
        config: &RuntimeConfig,
    ) -> Result<Self, UnitError> {
        let (unit, bindings) = proto.into_parts();
        let binder = VariableBinder::new(bindings);
        let handle = engine.create_instance(&unit.identity(), binder.as_map(&*unit))?;

        let mailbox = Mailbox::new();
        let sender = mailbox.sender();
        engine.subscribe(
            handle,
            Box::new(move |event: &str, payload| {
                sender.send(InstanceSignal::notify(event, payload))
            }),
        )?;

        Ok(Self::created(
            unit,
            InstanceKind::Process(ProcessSession {
                engine,
                handle,
                binder,
            }),
            mailbox,
            Vec::new(),
            config,
        ))
    }

    /// Creates a guard watching `watched`.
    pub fn guard<U: Unit>(
        unit: U,
        watched: impl IntoIterator<Item = InstanceId>,
        config: &RuntimeConfig,
    ) -> Self {
        let mut references: Vec<InstanceId> = Vec::new();
        for id in watched {
            if !references.contains(&id) {
                references.push(id);
            }
        }
        Self::created(
            Box::new(unit),
            InstanceKind::Guard,
            Mailbox::new(),
            references,
            config,
        )
    }

    fn created(
        mut unit: Box<dyn Unit>,
        kind: InstanceKind,
        mailbox: Mailbox,
        references: Vec<InstanceId>,
        config: &RuntimeConfig,
    ) -> Self {
        let id = InstanceId::new();
        log::debug!("instance {} created for unit {}", id, unit.identity());
        unit.on_create();
        UnitInstance {
            id,
            unit,
            kind,
            state: State::Created,
            history: vec![State::Created],
            mailbox,
            references,
            halt_policy: config.halt_policy,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Every state this instance has been in, oldest first.
    pub fn history(&self) -> &[State] {
        &self.history
    }

    pub fn unit(&self) -> &dyn Unit {
        &*self.unit
    }

    /// The owned unit, downcast to its concrete type.
    pub fn unit_as<U: Unit>(&self) -> Option<&U> {
        let unit: &dyn Unit = &*self.unit;
        unit.as_any().downcast_ref::<U>()
    }

    pub fn kind(&self) -> &InstanceKind {
        &self.kind
    }

    pub fn is_guard(&self) -> bool {
        matches!(self.kind, InstanceKind::Guard)
    }

    pub fn engine_handle(&self) -> Option<EngineHandle> {
        match &self.kind {
            InstanceKind::Process(session) => Some(session.handle),
            InstanceKind::Guard => None,
        }
    }

    /// Instances this one references, in the order they were recorded.
    pub fn references(&self) -> &[InstanceId] {
        &self.references
    }

    /// Records a reference; duplicates are ignored.
    pub fn add_reference(&mut self, id: InstanceId) {
        if !self.references.contains(&id) {
            self.references.push(id);
        }
    }

    /// A sender for this instance's mailbox, usable from any thread.
    pub fn mailbox(&self) -> SignalSender {
        self.mailbox.sender()
    }

    pub fn pending_signals(&self) -> usize {
        self.mailbox.len()
    }

    fn transition(&mut self, to: State) -> Result<(), UnitError> {
        if !self.state.can_transition_to(to) {
            return Err(UnitError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        log::debug!(
            "instance {} ({}): {} -> {}",
            self.id,
            self.unit.identity(),
            self.state,
            to
        );
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Runs whichever step the current state calls for: `start` when
    /// `Created`, `resume` when `Resuming`.
    pub fn step(&mut self) -> Result<(), UnitError> {
        match self.state {
            State::Created => self.start(),
            State::Resuming => self.resume(),
            state => Err(UnitError::IllegalOperation {
                operation: "step",
                state,
            }),
        }
    }

    /// Starts the instance: `Created -> Entering -> Running`, then hands off
    /// to the engine and settles in `Suspended` or `Completed`.
    pub fn start(&mut self) -> Result<(), UnitError> {
        if self.state != State::Created {
            return Err(UnitError::IllegalOperation {
                operation: "start",
                state: self.state,
            });
        }
        self.unit.on_start();
        self.transition(State::Entering)?;
        self.unit.on_enter();
        self.transition(State::Running)?;

        let outcome = match &self.kind {
            InstanceKind::Process(session) => session
                .copy_bindings_in(&*self.unit)
                .and_then(|()| session.engine.start(session.handle)),
            InstanceKind::Guard => Ok(()),
        };
        self.settle(outcome)?;
        self.copy_bindings_out();
        Ok(())
    }

    /// Resumes a suspended instance.
    ///
    /// Goes through `Resuming -> ReEntering`, delivers every queued signal in
    /// arrival order, and only then returns to `Running` and asks the engine
    /// to continue.
    pub fn resume(&mut self) -> Result<(), UnitError> {
        match self.state {
            State::Suspended => self.transition(State::Resuming)?,
            State::Resuming => {}
            state => {
                return Err(UnitError::IllegalOperation {
                    operation: "resume",
                    state,
                });
            }
        }
        self.unit.on_resume();
        self.transition(State::ReEntering)?;
        self.unit.on_re_enter();

        let delivered = self.mailbox.drain(|signal| {
            deliver(&mut *self.unit, &self.kind, &mut self.references, signal)
        });
        if delivered > 0 {
            log::debug!("instance {} drained {} signal(s)", self.id, delivered);
        }

        self.transition(State::Running)?;
        let outcome = match &self.kind {
            InstanceKind::Process(session) => session.engine.resume(session.handle),
            InstanceKind::Guard => Ok(()),
        };
        self.settle(outcome)?;
        self.copy_bindings_out();
        Ok(())
    }

    /// Pauses a running instance.
    pub fn suspend(&mut self) -> Result<(), UnitError> {
        if self.state != State::Running {
            return Err(UnitError::IllegalOperation {
                operation: "suspend",
                state: self.state,
            });
        }
        self.transition(State::Suspended)?;
        self.unit.on_suspend();
        Ok(())
    }

    /// Aborts the instance: `Aborting -> Completed`, delegating the abort to
    /// the engine.
    ///
    /// On an already completed instance the outcome depends on the
    /// [`HaltPolicy`]. The instance is completed even when the engine-side
    /// abort fails; that failure is returned afterwards.
    pub fn halt(&mut self) -> Result<(), UnitError> {
        if self.state.is_terminal() {
            return match self.halt_policy {
                HaltPolicy::Ignore => {
                    log::debug!("instance {} already completed, ignoring halt", self.id);
                    Ok(())
                }
                HaltPolicy::Reject => Err(UnitError::IllegalTransition {
                    from: self.state,
                    to: State::Aborting,
                }),
            };
        }
        self.transition(State::Aborting)?;
        let aborted = match &self.kind {
            InstanceKind::Process(session) => session.engine.abort(session.handle),
            InstanceKind::Guard => Ok(()),
        };
        self.transition(State::Completed)?;
        self.unit.on_end();
        self.copy_bindings_out();
        aborted.map_err(UnitError::from)
    }

    /// Queues a signal for the next drain.
    ///
    /// A suspended instance is marked `Resuming` so the driver picks it up.
    /// A completed instance never drains again, so the signal is dropped.
    pub fn signal(&mut self, signal: InstanceSignal) -> Result<(), UnitError> {
        if self.state.is_terminal() {
            log::trace!(
                "instance {} is completed, dropping {} signal",
                self.id,
                signal.kind()
            );
            return Ok(());
        }
        self.mailbox.push(signal);
        self.wake_if_signalled()?;
        Ok(())
    }

    /// Moves a suspended instance to `Resuming` if its mailbox holds signals
    /// (possibly pushed from another thread), or if it is a guard whose
    /// watch-set has drained. Returns whether it woke up.
    pub fn wake_if_signalled(&mut self) -> Result<bool, UnitError> {
        if self.state != State::Suspended {
            return Ok(false);
        }
        let drained_guard = self.is_guard() && self.references.is_empty();
        if drained_guard || self.mailbox.has_pending() {
            self.transition(State::Resuming)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Hand-off to another instance; no instance kind supports it yet.
    pub fn yield_to(&mut self, _next: InstanceId) -> Result<(), UnitError> {
        Err(UnitError::Unsupported { operation: "yield" })
    }

    /// Drops `dependency` from a guard's watch-set. Returns whether it was watched.
    ///
    /// The guard's lifecycle state is left alone.
    pub fn unwatch(&mut self, dependency: InstanceId) -> Result<bool, UnitError> {
        if !self.is_guard() {
            return Err(UnitError::NotAGuard(self.id));
        }
        let before = self.references.len();
        self.references.retain(|id| *id != dependency);
        Ok(self.references.len() < before)
    }

    fn settle(&mut self, outcome: Result<(), EngineError>) -> Result<(), UnitError> {
        if let Err(error) = outcome {
            return self.fault(error);
        }
        let paused = match &self.kind {
            InstanceKind::Process(session) => session.engine.is_active(session.handle),
            InstanceKind::Guard => !self.references.is_empty(),
        };
        if paused {
            self.transition(State::Suspended)?;
            self.unit.on_suspend();
        } else {
            self.transition(State::Exiting)?;
            self.unit.on_exit();
            self.transition(State::Completed)?;
            self.unit.on_end();
        }
        Ok(())
    }

    fn fault(&mut self, error: EngineError) -> Result<(), UnitError> {
        log::warn!(
            "instance {} ({}) faulted: {}",
            self.id,
            self.unit.identity(),
            error
        );
        self.transition(State::Faulted)?;
        self.unit.on_fault(&error);
        self.transition(State::Completed)?;
        self.unit.on_end();
        Ok(())
    }

    fn copy_bindings_out(&mut self) {
        let InstanceKind::Process(session) = &self.kind else {
            return;
        };
        if session.binder.is_empty() {
            return;
        }
        match session.engine.variables(session.handle) {
            Ok(vars) => session.binder.update_bindings(&mut *self.unit, &vars),
            Err(e) => log::warn!("instance {}: could not read back variables: {}", self.id, e),
        }
    }
}

fn deliver(
    unit: &mut dyn Unit,
    kind: &InstanceKind,
    references: &mut Vec<InstanceId>,
    signal: InstanceSignal,
) {
    match (kind, &signal) {
        (_, InstanceSignal::Notify { .. }) => unit.on_signal(&signal),
        (InstanceKind::Process(session), InstanceSignal::Event { event, payload }) => {
            if let Err(e) = session
                .engine
                .signal_event(session.handle, event, payload.clone())
            {
                log::warn!("event {} not delivered to {}: {}", event, session.handle, e);
            }
            unit.on_signal(&signal);
        }
        (InstanceKind::Guard, InstanceSignal::Unwatch(dependency)) => {
            references.retain(|id| id != dependency);
            unit.on_signal(&signal);
        }
        _ => log::trace!(
            "dropping {} signal not handled by unit {}",
            signal.kind(),
            unit.identity()
        ),
    }
}

impl fmt::Debug for UnitInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitInstance")
            .field("id", &self.id)
            .field("unit", &self.unit.identity())
            .field("state", &self.state)
            .field("references", &self.references)
            .field("pending_signals", &self.mailbox.len())
            .finish()
    }
}
