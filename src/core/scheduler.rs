use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::core::error::UnitError;
use crate::core::instance::UnitInstance;
use crate::core::signal::{SchedulerSignal, Signal, UnregisterGuard};
use crate::core::InstanceId;

/// Keeps track of the currently scheduled instances.
///
/// The scheduler is a stack: `schedule` pushes on the head, `next` pops from
/// it. Before popping, `next` appends the references of the instance it is
/// leaving to the tail, which is how supervisors and guards get their turn.
///
/// It also owns every registered [`UnitInstance`]. Everything else (the
/// pending list, references, guards) only holds [`InstanceId`]s.
#[derive(Default)]
pub struct UnitScheduler {
    instances: HashMap<InstanceId, UnitInstance>,
    current: Option<InstanceId>,
    pending: VecDeque<InstanceId>,
}

impl UnitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves an instance into the registry. It is not scheduled yet.
    pub fn register(&mut self, instance: UnitInstance) -> InstanceId {
        let id = instance.id();
        self.instances.insert(id, instance);
        id
    }

    pub fn instance(&self, id: InstanceId) -> Option<&UnitInstance> {
        self.instances.get(&id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut UnitInstance> {
        self.instances.get_mut(&id)
    }

    /// Takes an instance out of the registry and the run-stack.
    ///
    /// References other instances hold to it are left dangling; `next` skips
    /// ids it cannot resolve.
    pub fn remove(&mut self, id: InstanceId) -> Option<UnitInstance> {
        if self.current == Some(id) {
            self.current = None;
        }
        self.pending.retain(|p| *p != id);
        self.instances.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The instance the stack pointer designates, if any.
    pub fn current(&self) -> Option<InstanceId> {
        self.current
    }

    pub fn current_instance(&self) -> Option<&UnitInstance> {
        self.current.and_then(|id| self.instances.get(&id))
    }

    pub fn current_instance_mut(&mut self) -> Option<&mut UnitInstance> {
        self.current.and_then(|id| self.instances.get_mut(&id))
    }

    /// Instances waiting to run, head first.
    pub fn pending(&self) -> &VecDeque<InstanceId> {
        &self.pending
    }

    /// Clears the current pointer and pushes `id` on the head.
    pub fn schedule(&mut self, id: InstanceId) -> Result<(), UnitError> {
        if !self.instances.contains_key(&id) {
            return Err(UnitError::UnknownInstance(id));
        }
        self.current = None;
        self.pending.push_front(id);
        Ok(())
    }

    /// Schedules `candidate` right before an insertion point.
    ///
    /// If the current instance is the insertion point, it is pushed back
    /// with `candidate` on top of it, so `candidate` runs next and the current
    /// instance right after. Otherwise `candidate` goes in front of the first
    /// pending instance matching the predicate.
    ///
    /// Fails with [`UnitError::InsertionPointNotFound`] when nothing matches;
    /// the run-stack is left untouched in that case.
    pub fn schedule_after<P>(
        &mut self,
        candidate: InstanceId,
        is_insertion_point: P,
    ) -> Result<(), UnitError>
    where
        P: Fn(&UnitInstance) -> bool,
    {
        if !self.instances.contains_key(&candidate) {
            return Err(UnitError::UnknownInstance(candidate));
        }

        if let Some(current) = self.current {
            if self.instances.get(&current).is_some_and(&is_insertion_point) {
                self.pending.push_front(current);
                self.pending.push_front(candidate);
                return Ok(());
            }
        }

        let index = self.pending.iter().position(|id| {
            self.instances
                .get(id)
                .is_some_and(|inst| is_insertion_point(inst))
        });
        match index {
            Some(idx) => {
                self.pending.insert(idx, candidate);
                Ok(())
            }
            None => {
                log::warn!(
                    "no insertion point for {} among {} pending",
                    candidate,
                    self.pending.len()
                );
                Err(UnitError::InsertionPointNotFound)
            }
        }
    }

    /// Advances the stack pointer to the next active instance.
    ///
    /// The references of the instance being left are appended to the tail
    /// first, in the order they were recorded. Popped instances pick up
    /// signals that arrived while they were suspended. Those that are not
    /// active, or no longer registered, are discarded.
    pub fn next(&mut self) -> Option<InstanceId> {
        if let Some(current) = self.current.take() {
            if let Some(inst) = self.instances.get(&current) {
                self.pending.extend(inst.references().iter().copied());
            }
        }

        while let Some(id) = self.pending.pop_front() {
            let Some(inst) = self.instances.get_mut(&id) else {
                log::trace!("skipping unregistered instance {}", id);
                continue;
            };
            if let Err(e) = inst.wake_if_signalled() {
                log::warn!("instance {} could not wake up: {}", id, e);
            }
            if inst.state().is_active() {
                self.current = Some(id);
                return Some(id);
            }
            log::trace!("skipping instance {} in state {}", id, inst.state());
        }
        None
    }

    /// Halts the current instance.
    ///
    /// Once it is completed, guards watching it are released the same way
    /// as after a regular completion, even if the engine-side abort failed.
    pub fn halt(&mut self) -> Result<(), UnitError> {
        let id = self.current.ok_or(UnitError::NoCurrentInstance)?;
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(UnitError::UnknownInstance(id))?;
        let halted = instance.halt();
        if instance.state().is_terminal() && !instance.references().is_empty() {
            self.signal(&UnregisterGuard::new(id))?;
        }
        halted
    }

    /// Runs a scheduler signal against this scheduler.
    pub fn signal(&mut self, signal: &dyn SchedulerSignal) -> Result<(), UnitError> {
        log::debug!("scheduler signal {}", signal.name());
        signal.exec(self)
    }

    /// Routes an addressed signal to an instance mailbox or to [`signal`](Self::signal).
    pub fn dispatch(&mut self, signal: Signal) -> Result<(), UnitError> {
        match signal {
            Signal::Instance { target, signal } => self
                .instances
                .get_mut(&target)
                .ok_or(UnitError::UnknownInstance(target))?
                .signal(signal),
            Signal::Scheduler(signal) => self.signal(&*signal),
        }
    }
}

impl fmt::Debug for UnitScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitScheduler")
            .field("current", &self.current)
            .field("pending", &self.pending)
            .field("instances", &self.instances.len())
            .finish()
    }
}
