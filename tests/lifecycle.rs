//! Integration tests for the instance lifecycle as seen through the executor.
//!
//! Each unit records its callbacks, so the observed sequences can be compared
//! with the lifecycle the runtime promises.

use serde_json::json;
use std::sync::Arc;
use unitary::prelude::*;
use unitary::WORK_ITEM_COMPLETED;

#[derive(Default)]
struct Recorder {
    process: &'static str,
    seen: Vec<State>,
    log: Vec<String>,
    count: i64,
}

impl Recorder {
    fn new(process: &'static str) -> Self {
        Recorder {
            process,
            ..Default::default()
        }
    }
}

impl Unit for Recorder {
    fn identity(&self) -> String {
        self.process.to_string()
    }
    fn on_create(&mut self) {
        self.seen.push(State::Created);
    }
    fn on_enter(&mut self) {
        self.seen.push(State::Entering);
    }
    fn on_suspend(&mut self) {
        self.seen.push(State::Suspended);
    }
    fn on_re_enter(&mut self) {
        self.seen.push(State::ReEntering);
        self.log.push("re_enter".into());
    }
    fn on_exit(&mut self) {
        self.seen.push(State::Exiting);
        self.log.push("exit".into());
    }
    fn on_fault(&mut self, _error: &EngineError) {
        self.seen.push(State::Faulted);
    }
    fn on_end(&mut self) {
        self.seen.push(State::Completed);
    }
    fn on_signal(&mut self, signal: &InstanceSignal) {
        if let InstanceSignal::Notify { event, .. } = signal {
            self.log.push(event.clone());
        }
    }
    fn bindings(&self) -> Vec<UnitBinding> {
        vec![UnitBinding::new(
            "count",
            |r: &Recorder| json!(r.count),
            |r: &mut Recorder, v| r.count = v.as_i64().unwrap_or_default(),
        )]
    }
}

fn setup() -> (Arc<MemoryEngine>, UnitExecutor) {
    let engine = Arc::new(MemoryEngine::new());
    engine
        .register(ProcessDefinition::new("hello").script(|vars| {
            vars.insert("greeting".into(), json!("hello"));
            Ok(())
        }))
        .register(ProcessDefinition::new("broken").fail("division by zero"))
        .register(ProcessDefinition::new("human_task").work_item("Human Task"))
        .register(ProcessDefinition::new("times_ten").script(|vars| {
            let count = vars
                .get("count")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| "count is not set".to_string())?;
            vars.insert("count".into(), json!(count * 10));
            Ok(())
        }));
    let executor = UnitExecutor::new(engine.clone());
    (engine, executor)
}

fn seen(executor: &UnitExecutor, id: InstanceId) -> Vec<State> {
    executor
        .instance(id)
        .unwrap()
        .unit_as::<Recorder>()
        .unwrap()
        .seen
        .clone()
}

#[test]
fn test_successful_unit_lifecycle() {
    let (_engine, mut executor) = setup();
    let id = executor.run(Recorder::new("hello")).unwrap();

    assert_eq!(
        seen(&executor, id),
        vec![State::Created, State::Entering, State::Exiting, State::Completed]
    );
    assert_eq!(executor.instance(id).unwrap().state(), State::Completed);
    assert_eq!(executor.current(), None);
}

#[test]
fn test_failing_unit_is_contained() {
    let (_engine, mut executor) = setup();
    let id = executor.run(Recorder::new("broken")).unwrap();

    assert_eq!(
        seen(&executor, id),
        vec![State::Created, State::Entering, State::Faulted, State::Completed]
    );
    let history = executor.instance(id).unwrap().history();
    assert!(history.windows(2).all(|w| w[0].can_transition_to(w[1])));
}

#[test]
fn test_variables_round_trip_through_engine() {
    let (_engine, mut executor) = setup();
    let mut unit = Recorder::new("times_ten");
    unit.count = 10;
    let id = executor.run(unit).unwrap();

    let unit = executor.instance(id).unwrap().unit_as::<Recorder>().unwrap();
    assert_eq!(unit.count, 100);
}

#[test]
fn test_pause_and_resume_on_work_item_completion() {
    let (engine, mut executor) = setup();
    let id = executor.run(Recorder::new("human_task")).unwrap();

    assert_eq!(
        seen(&executor, id),
        vec![State::Created, State::Entering, State::Suspended]
    );
    assert_eq!(executor.instance(id).unwrap().state(), State::Suspended);

    let items = engine.pending_work_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Human Task");
    engine
        .complete_work_item(items[0].id, Variables::new())
        .unwrap();

    executor.run_instance(id).unwrap();
    assert_eq!(
        seen(&executor, id)[3..].to_vec(),
        vec![State::ReEntering, State::Exiting, State::Completed]
    );
}

#[test]
fn test_every_recorded_transition_is_legal() {
    let (engine, mut executor) = setup();
    let ids = [
        executor.run(Recorder::new("hello")).unwrap(),
        executor.run(Recorder::new("broken")).unwrap(),
        executor.run(Recorder::new("human_task")).unwrap(),
    ];
    let item = engine.pending_work_items().remove(0);
    engine.complete_work_item(item.id, Variables::new()).unwrap();
    executor.run_instance(ids[2]).unwrap();

    for id in ids {
        let history = executor.instance(id).unwrap().history();
        assert_eq!(history.first(), Some(&State::Created));
        assert_eq!(history.last(), Some(&State::Completed));
        for pair in history.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} is not a lifecycle edge",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn test_halt_on_completed_instance_follows_policy() {
    let engine = Arc::new(MemoryEngine::new());
    engine.register(ProcessDefinition::new("hello"));

    let mut lenient = UnitExecutor::new(engine.clone());
    let id = lenient.run(Recorder::new("hello")).unwrap();
    lenient.scheduler_mut().schedule(id).unwrap();
    // a completed instance is never made current again
    assert_eq!(lenient.scheduler_mut().next(), None);
    assert!(lenient.scheduler_mut().instance_mut(id).unwrap().halt().is_ok());

    let mut strict = UnitExecutor::with_config(
        engine,
        RuntimeConfig::default().with_halt_policy(HaltPolicy::Reject),
    );
    let id = strict.run(Recorder::new("hello")).unwrap();
    let err = strict
        .scheduler_mut()
        .instance_mut(id)
        .unwrap()
        .halt()
        .unwrap_err();
    assert_eq!(err.as_label(), "illegal_transition");
}

#[tokio::test]
async fn test_cross_thread_completion_delivers_signals_in_order() {
    let (engine, mut executor) = setup();
    let id = executor.run(Recorder::new("human_task")).unwrap();
    assert_eq!(executor.instance(id).unwrap().state(), State::Suspended);

    let sender = executor.instance(id).unwrap().mailbox();
    let remote = engine.clone();
    tokio::task::spawn_blocking(move || {
        let item = remote.pending_work_items().remove(0);
        remote.complete_work_item(item.id, Variables::new()).unwrap();
        for name in ["s1", "s2", "s3"] {
            sender.send(InstanceSignal::notify(name, json!({ "from": "worker" })));
        }
    })
    .await
    .unwrap();

    assert_eq!(executor.instance(id).unwrap().pending_signals(), 4);
    executor.run_instance(id).unwrap();

    let instance = executor.instance(id).unwrap();
    assert_eq!(instance.state(), State::Completed);
    assert_eq!(instance.pending_signals(), 0);
    assert_eq!(
        instance.unit_as::<Recorder>().unwrap().log,
        vec!["re_enter", WORK_ITEM_COMPLETED, "s1", "s2", "s3", "exit"]
    );
    assert_eq!(
        &instance.history()[3..],
        &[
            State::Suspended,
            State::Resuming,
            State::ReEntering,
            State::Running,
            State::Exiting,
            State::Completed
        ]
    );
}
