//! A scripted, in-memory [`Engine`].
//!
//! Processes are linear lists of [`Step`]s. A process runs until it finishes,
//! fails, or reaches a wait state (a work item or a named event). Wait states
//! are released from outside: [`MemoryEngine::complete_work_item`] (from any
//! thread) or [`Engine::signal_event`]. The instance then continues on the
//! next [`Engine::resume`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::core::engine::{Engine, EngineHandle, EventListener};
use crate::core::error::EngineError;
use crate::core::signal::WORK_ITEM_COMPLETED;
use crate::core::{UnitValue, Variables};

type Script = Arc<dyn Fn(&mut Variables) -> Result<(), String> + Send + Sync>;

/// One step of a [`ProcessDefinition`].
#[derive(Clone)]
pub enum Step {
    /// Mutates the process variables; an `Err` faults the process.
    Script(Script),
    /// Waits until the named work item is completed.
    WorkItem(String),
    /// Waits until the named event is signalled; its payload is stored under the event name.
    Event(String),
    /// Faults the process with the given message.
    Fail(String),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Script(_) => f.write_str("Script"),
            Step::WorkItem(name) => f.debug_tuple("WorkItem").field(name).finish(),
            Step::Event(name) => f.debug_tuple("Event").field(name).finish(),
            Step::Fail(msg) => f.debug_tuple("Fail").field(msg).finish(),
        }
    }
}

/// A named, linear process.
#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    id: String,
    steps: Vec<Step>,
}

impl ProcessDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        ProcessDefinition {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    pub fn script<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Variables) -> Result<(), String> + Send + Sync + 'static,
    {
        self.steps.push(Step::Script(Arc::new(f)));
        self
    }

    pub fn work_item(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::WorkItem(name.into()));
        self
    }

    pub fn wait_event(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::Event(name.into()));
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Engine-side state of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created but not started.
    Pending,
    /// Running or waiting on something external.
    Active,
    Completed,
    Aborted,
    Failed,
}

/// Pending external work a process is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub name: String,
    pub handle: EngineHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Wait {
    WorkItem(u64),
    Event(String),
}

struct ProcessRecord {
    definition: Arc<ProcessDefinition>,
    cursor: usize,
    state: ProcessState,
    variables: Variables,
    waiting: Option<Wait>,
    listeners: Vec<Arc<EventListener>>,
}

#[derive(Default)]
struct Inner {
    definitions: HashMap<String, Arc<ProcessDefinition>>,
    processes: HashMap<EngineHandle, ProcessRecord>,
    work_items: HashMap<u64, WorkItem>,
    next_handle: u64,
    next_work_item: u64,
}

impl Inner {
    fn process_mut(&mut self, handle: EngineHandle) -> Result<&mut ProcessRecord, EngineError> {
        self.processes
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))
    }

    /// Runs `handle` from its cursor until it completes, fails or waits.
    fn run(&mut self, handle: EngineHandle) -> Result<(), EngineError> {
        loop {
            let record = self.process_mut(handle)?;
            if record.waiting.is_some() {
                return Ok(());
            }
            let Some(step) = record.definition.steps.get(record.cursor).cloned() else {
                record.state = ProcessState::Completed;
                log::debug!("process {} completed", handle);
                return Ok(());
            };
            record.cursor += 1;

            match step {
                Step::Script(script) => {
                    if let Err(msg) = script(&mut record.variables) {
                        record.state = ProcessState::Failed;
                        return Err(EngineError::Fault(msg));
                    }
                }
                Step::Fail(msg) => {
                    record.state = ProcessState::Failed;
                    return Err(EngineError::Fault(msg));
                }
                Step::Event(name) => {
                    record.waiting = Some(Wait::Event(name));
                }
                Step::WorkItem(name) => {
                    self.next_work_item += 1;
                    let id = self.next_work_item;
                    self.process_mut(handle)?.waiting = Some(Wait::WorkItem(id));
                    log::debug!("process {} waiting on work item {} ({})", handle, id, name);
                    self.work_items.insert(id, WorkItem { id, name, handle });
                }
            }
        }
    }
}

/// In-memory engine running [`ProcessDefinition`]s.
#[derive(Default)]
pub struct MemoryEngine {
    inner: Mutex<Inner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, replacing any previous one with the same id.
    pub fn register(&self, definition: ProcessDefinition) -> &Self {
        let mut inner = self.inner.lock();
        if inner.definitions.contains_key(definition.id()) {
            log::warn!(
                "Process {} was already registered, overwriting it.",
                definition.id()
            );
        }
        inner
            .definitions
            .insert(definition.id.clone(), Arc::new(definition));
        self
    }

    /// Work items waiting for completion, oldest first.
    pub fn pending_work_items(&self) -> Vec<WorkItem> {
        let inner = self.inner.lock();
        let mut items: Vec<_> = inner.work_items.values().cloned().collect();
        items.sort_by_key(|w| w.id);
        items
    }

    pub fn state_of(&self, handle: EngineHandle) -> Option<ProcessState> {
        self.inner.lock().processes.get(&handle).map(|p| p.state)
    }

    /// Completes a work item, merging `results` into the process variables.
    ///
    /// Listeners of the owning process are notified with
    /// [`WORK_ITEM_COMPLETED`] after the engine lock is released, on the
    /// calling thread. The process itself moves on at its next `resume`.
    pub fn complete_work_item(&self, id: u64, results: Variables) -> Result<(), EngineError> {
        let (listeners, payload) = {
            let mut inner = self.inner.lock();
            let item = inner
                .work_items
                .remove(&id)
                .ok_or_else(|| EngineError::Fault(format!("unknown work item {id}")))?;
            let record = inner.process_mut(item.handle)?;
            if record.waiting != Some(Wait::WorkItem(id)) {
                return Err(EngineError::NotActive(item.handle));
            }
            record.variables.extend(results);
            record.waiting = None;
            (
                record.listeners.clone(),
                json!({ "workItemId": id, "name": item.name }),
            )
        };

        for listener in listeners {
            listener(WORK_ITEM_COMPLETED, payload.clone());
        }
        Ok(())
    }
}

impl Engine for MemoryEngine {
    fn create_instance(
        &self,
        identity: &str,
        variables: Variables,
    ) -> Result<EngineHandle, EngineError> {
        let mut inner = self.inner.lock();
        let definition = inner
            .definitions
            .get(identity)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProcess(identity.to_string()))?;
        inner.next_handle += 1;
        let handle = EngineHandle(inner.next_handle);
        inner.processes.insert(
            handle,
            ProcessRecord {
                definition,
                cursor: 0,
                state: ProcessState::Pending,
                variables,
                waiting: None,
                listeners: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn start(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        let record = inner.process_mut(handle)?;
        if record.state != ProcessState::Pending {
            return Err(EngineError::NotActive(handle));
        }
        record.state = ProcessState::Active;
        inner.run(handle)
    }

    fn resume(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.process_mut(handle)?.state != ProcessState::Active {
            return Err(EngineError::NotActive(handle));
        }
        inner.run(handle)
    }

    fn abort(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        let record = inner.process_mut(handle)?;
        match record.state {
            ProcessState::Pending | ProcessState::Active => {
                record.state = ProcessState::Aborted;
                record.waiting = None;
                inner.work_items.retain(|_, w| w.handle != handle);
                Ok(())
            }
            _ => Err(EngineError::NotActive(handle)),
        }
    }

    fn signal_event(
        &self,
        handle: EngineHandle,
        event: &str,
        payload: UnitValue,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        let record = inner.process_mut(handle)?;
        if record.state != ProcessState::Active {
            return Err(EngineError::NotActive(handle));
        }
        match &record.waiting {
            Some(Wait::Event(name)) if name == event => {
                record.variables.insert(event.to_string(), payload);
                record.waiting = None;
            }
            _ => log::trace!("process {} is not waiting on event {}", handle, event),
        }
        Ok(())
    }

    fn is_active(&self, handle: EngineHandle) -> bool {
        self.state_of(handle) == Some(ProcessState::Active)
    }

    fn variables(&self, handle: EngineHandle) -> Result<Variables, EngineError> {
        Ok(self.inner.lock().process_mut(handle)?.variables.clone())
    }

    fn set_variables(
        &self,
        handle: EngineHandle,
        variables: Variables,
    ) -> Result<(), EngineError> {
        self.inner
            .lock()
            .process_mut(handle)?
            .variables
            .extend(variables);
        Ok(())
    }

    fn subscribe(&self, handle: EngineHandle, listener: EventListener) -> Result<(), EngineError> {
        self.inner
            .lock()
            .process_mut(handle)?
            .listeners
            .push(Arc::new(listener));
        Ok(())
    }
}
