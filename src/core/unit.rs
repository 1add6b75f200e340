use crate::core::binding::UnitBinding;
use crate::core::error::EngineError;
use crate::core::signal::InstanceSignal;
use crate::core::AsAny;

/// Describes a resumable computation.
///
/// A `Unit` carries an identity and reacts to lifecycle callbacks. The actual
/// work is done by the engine the owning
/// [`UnitInstance`](crate::core::instance::UnitInstance) delegates to.
/// Every callback has a no-op default, so a unit only implements the ones it cares about.
///
/// Callbacks fire in lifecycle order:
/// 1. `on_create` once the instance exists
/// 2. `on_start`, `on_enter` when it starts
/// 3. `on_suspend` when the engine pauses, then `on_resume`, `on_re_enter` when it is resumed
/// 4. `on_exit`, `on_end` when the engine completes
///
/// A fault replaces step 4 with `on_fault`, `on_end`.
pub trait Unit: AsAny + Send + 'static {
    /// Identity of the computation, used to create the engine-side instance.
    fn identity(&self) -> String;

    fn on_create(&mut self) {}

    fn on_start(&mut self) {}

    fn on_enter(&mut self) {}

    fn on_re_enter(&mut self) {}

    fn on_suspend(&mut self) {}

    fn on_resume(&mut self) {}

    /// The engine reported completion; the instance is about to finish.
    fn on_exit(&mut self) {}

    /// The running step failed. The instance completes right after, without retry.
    fn on_fault(&mut self, _error: &EngineError) {}

    /// Last callback of every lifecycle, whatever the path to `Completed`.
    fn on_end(&mut self) {}

    /// A drained signal the instance recognised.
    fn on_signal(&mut self, _signal: &InstanceSignal) {}

    /// Variables this unit exchanges with the engine.
    fn bindings(&self) -> Vec<UnitBinding> {
        Vec::new()
    }
}

/// A unit bundled with the bindings it should run with.
pub struct Proto {
    unit: Box<dyn Unit>,
    bindings: Vec<UnitBinding>,
}

impl Proto {
    /// Creates a proto from a unit and the bindings it declares.
    pub fn new<U: Unit>(unit: U) -> Self {
        let bindings = unit.bindings();
        Proto {
            unit: Box::new(unit),
            bindings,
        }
    }

    /// Adds a binding on top of the ones the unit declares.
    pub fn with_binding(mut self, binding: UnitBinding) -> Self {
        if self.bindings.iter().any(|b| b.name() == binding.name()) {
            log::warn!(
                "Binding {} was already declared, overwriting it.",
                binding.name()
            );
            self.bindings.retain(|b| b.name() != binding.name());
        }
        self.bindings.push(binding);
        self
    }

    pub fn unit(&self) -> &dyn Unit {
        &*self.unit
    }

    pub fn bindings(&self) -> &[UnitBinding] {
        &self.bindings
    }

    pub(crate) fn into_parts(self) -> (Box<dyn Unit>, Vec<UnitBinding>) {
        (self.unit, self.bindings)
    }
}
