use crate::core::unit::Unit;
use crate::core::{UnitValue, Variables};

type Getter = Box<dyn Fn(&dyn Unit) -> Option<UnitValue> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Unit, UnitValue) -> bool + Send + Sync>;

/// Ties a unit field to an engine variable.
///
/// The accessors are written against the concrete unit type and downcast
/// through [`AsAny`](crate::core::AsAny), so a binding applied to a different
/// unit type just reads nothing and writes nothing.
pub struct UnitBinding {
    name: String,
    get: Getter,
    set: Setter,
}

impl UnitBinding {
    pub fn new<U, G, S>(name: impl Into<String>, get: G, set: S) -> Self
    where
        U: Unit,
        G: Fn(&U) -> UnitValue + Send + Sync + 'static,
        S: Fn(&mut U, UnitValue) + Send + Sync + 'static,
    {
        UnitBinding {
            name: name.into(),
            get: Box::new(move |unit: &dyn Unit| unit.as_any().downcast_ref::<U>().map(&get)),
            set: Box::new(move |unit: &mut dyn Unit, value| {
                match unit.as_any_mut().downcast_mut::<U>() {
                    Some(u) => {
                        set(u, value);
                        true
                    }
                    None => false,
                }
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the bound field, or `None` if `unit` is not the bound type.
    pub fn read(&self, unit: &dyn Unit) -> Option<UnitValue> {
        (self.get)(unit)
    }

    /// Writes the bound field. Returns `false` if `unit` is not the bound type.
    pub fn write(&self, unit: &mut dyn Unit, value: UnitValue) -> bool {
        (self.set)(unit, value)
    }
}

impl std::fmt::Debug for UnitBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitBinding").field("name", &self.name).finish()
    }
}

/// Copies bound values between a unit and the engine's variable map.
#[derive(Debug, Default)]
pub struct VariableBinder {
    bindings: Vec<UnitBinding>,
}

impl VariableBinder {
    pub fn new(bindings: Vec<UnitBinding>) -> Self {
        VariableBinder { bindings }
    }

    /// Snapshot of the bound fields, used as the engine's initial variables.
    pub fn as_map(&self, unit: &dyn Unit) -> Variables {
        self.bindings
            .iter()
            .filter_map(|b| b.read(unit).map(|v| (b.name.clone(), v)))
            .collect()
    }

    /// Writes engine-side values back into the unit.
    ///
    /// Bindings with no matching variable keep their current value.
    pub fn update_bindings(&self, unit: &mut dyn Unit, variables: &Variables) {
        for binding in &self.bindings {
            if let Some(value) = variables.get(&binding.name) {
                if !binding.write(unit, value.clone()) {
                    log::warn!(
                        "Binding {} does not match unit {}, skipping.",
                        binding.name,
                        unit.identity()
                    );
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Greeting {
        name: String,
        greeting: String,
    }

    impl Unit for Greeting {
        fn identity(&self) -> String {
            "greeting".into()
        }
    }

    struct Other;

    impl Unit for Other {
        fn identity(&self) -> String {
            "other".into()
        }
    }

    fn binder() -> VariableBinder {
        VariableBinder::new(vec![
            UnitBinding::new(
                "name",
                |g: &Greeting| json!(g.name),
                |g: &mut Greeting, v| g.name = v.as_str().unwrap_or_default().to_string(),
            ),
            UnitBinding::new(
                "greeting",
                |g: &Greeting| json!(g.greeting),
                |g: &mut Greeting, v| g.greeting = v.as_str().unwrap_or_default().to_string(),
            ),
        ])
    }

    #[test]
    fn test_as_map_reads_every_binding() {
        let unit = Greeting {
            name: "Ada".into(),
            ..Default::default()
        };
        let vars = binder().as_map(&unit);
        assert_eq!(vars.get("name"), Some(&json!("Ada")));
        assert_eq!(vars.get("greeting"), Some(&json!("")));
    }

    #[test]
    fn test_update_bindings_only_touches_present_variables() {
        let mut unit = Greeting {
            name: "Ada".into(),
            greeting: "hi".into(),
        };
        let mut vars = Variables::new();
        vars.insert("greeting".into(), json!("Hello, Ada!"));
        binder().update_bindings(&mut unit, &vars);
        assert_eq!(unit.name, "Ada");
        assert_eq!(unit.greeting, "Hello, Ada!");
    }

    #[test]
    fn test_binding_on_wrong_unit_type_is_inert() {
        let mut other = Other;
        assert!(binder().as_map(&other).is_empty());
        let binding =
            UnitBinding::new("name", |g: &Greeting| json!(g.name), |_: &mut Greeting, _| {});
        assert!(!binding.write(&mut other, json!("x")));
    }
}
