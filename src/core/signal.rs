//! Signals and their routing.
//!
//! A [`Signal`] is addressed either to one instance or to the scheduler:
//!
//! - [`InstanceSignal`]s are queued in the target's [`Mailbox`] and drained
//!   in arrival order the next time the instance resumes. The mailbox is the
//!   one piece of instance state that may be written from another thread,
//!   through a [`SignalSender`].
//! - [`SchedulerSignal`]s run immediately against the scheduler and may reach
//!   into any registered instance, e.g. [`UnregisterGuard`].

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::UnitError;
use crate::core::scheduler::UnitScheduler;
use crate::core::{InstanceId, UnitValue};

/// Event name the engine uses to report completed external work.
pub const WORK_ITEM_COMPLETED: &str = "workItemCompleted";

/// A message for a single instance.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceSignal {
    /// Raised by the engine on behalf of the instance, e.g. external work completing.
    Notify { event: String, payload: UnitValue },
    /// An event to forward into the engine-side instance.
    Event { event: String, payload: UnitValue },
    /// Drops a satisfied dependency from a guard's watch-set.
    Unwatch(InstanceId),
}

impl InstanceSignal {
    pub fn notify(event: impl Into<String>, payload: UnitValue) -> Self {
        InstanceSignal::Notify {
            event: event.into(),
            payload,
        }
    }

    pub fn event(event: impl Into<String>, payload: UnitValue) -> Self {
        InstanceSignal::Event {
            event: event.into(),
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InstanceSignal::Notify { .. } => "notify",
            InstanceSignal::Event { .. } => "event",
            InstanceSignal::Unwatch(_) => "unwatch",
        }
    }
}

/// FIFO of pending signals owned by an instance.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Arc<Mutex<VecDeque<InstanceSignal>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that can enqueue into this mailbox from any thread.
    pub fn sender(&self) -> SignalSender {
        SignalSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn push(&self, signal: InstanceSignal) {
        self.queue.lock().push_back(signal);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes everything queued so far, in arrival order.
    ///
    /// The queue is swapped out under the lock, so a concurrent push lands
    /// either in this batch or in the next one, never in between.
    pub fn take_batch(&self) -> VecDeque<InstanceSignal> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Hands every pending signal to `deliver`, including signals pushed while
    /// delivering, until the queue is observed empty.
    pub fn drain(&self, mut deliver: impl FnMut(InstanceSignal)) -> usize {
        let mut delivered = 0;
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return delivered;
            }
            delivered += batch.len();
            batch.into_iter().for_each(&mut deliver);
        }
    }
}

/// Cloneable, thread-safe handle to an instance's mailbox.
#[derive(Debug, Clone)]
pub struct SignalSender {
    queue: Arc<Mutex<VecDeque<InstanceSignal>>>,
}

impl SignalSender {
    pub fn send(&self, signal: InstanceSignal) {
        self.queue.lock().push_back(signal);
    }
}

/// A signal handled by the scheduler itself.
pub trait SchedulerSignal: Send {
    fn exec(&self, scheduler: &mut UnitScheduler) -> Result<(), UnitError>;

    fn name(&self) -> &'static str {
        "scheduler_signal"
    }
}

impl<F> SchedulerSignal for F
where
    F: Fn(&mut UnitScheduler) -> Result<(), UnitError> + Send,
{
    fn exec(&self, scheduler: &mut UnitScheduler) -> Result<(), UnitError> {
        self(scheduler)
    }
}

/// An addressed signal.
pub enum Signal {
    Instance {
        target: InstanceId,
        signal: InstanceSignal,
    },
    Scheduler(Box<dyn SchedulerSignal>),
}

impl Signal {
    pub fn to_instance(target: InstanceId, signal: InstanceSignal) -> Self {
        Signal::Instance { target, signal }
    }

    pub fn to_scheduler<S: SchedulerSignal + 'static>(signal: S) -> Self {
        Signal::Scheduler(Box::new(signal))
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Instance { target, signal } => f
                .debug_struct("Instance")
                .field("target", target)
                .field("signal", signal)
                .finish(),
            Signal::Scheduler(s) => f.debug_tuple("Scheduler").field(&s.name()).finish(),
        }
    }
}

/// Tells every guard watching the current instance that `dependency` is satisfied.
///
/// Only the guards' watch-sets change: no guard is halted, removed or moved
/// to another state.
#[derive(Debug, Clone, Copy)]
pub struct UnregisterGuard {
    dependency: InstanceId,
}

impl UnregisterGuard {
    pub fn new(dependency: InstanceId) -> Self {
        UnregisterGuard { dependency }
    }
}

impl SchedulerSignal for UnregisterGuard {
    fn exec(&self, scheduler: &mut UnitScheduler) -> Result<(), UnitError> {
        let references = scheduler
            .current_instance()
            .ok_or(UnitError::NoCurrentInstance)?
            .references()
            .to_vec();

        for id in references {
            match scheduler.instance_mut(id) {
                Some(guard) if guard.is_guard() => {
                    guard.unwatch(self.dependency)?;
                }
                Some(_) => {}
                None => log::trace!("reference {} is no longer registered", id),
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "unregister_guard"
    }
}
