//! Guards watching other instances through the executor.

use std::sync::Arc;
use unitary::prelude::*;
use unitary::UnregisterGuard;

#[derive(Default)]
struct Watcher {
    unwatched: usize,
}

impl Unit for Watcher {
    fn identity(&self) -> String {
        "watcher".to_string()
    }
    fn on_signal(&mut self, signal: &InstanceSignal) {
        if matches!(signal, InstanceSignal::Unwatch(_)) {
            self.unwatched += 1;
        }
    }
}

struct Activity;

impl Unit for Activity {
    fn identity(&self) -> String {
        "activity".to_string()
    }
}

fn setup() -> (Arc<MemoryEngine>, UnitExecutor) {
    let engine = Arc::new(MemoryEngine::new());
    engine.register(ProcessDefinition::new("activity").work_item("Review"));
    let executor = UnitExecutor::new(engine.clone());
    (engine, executor)
}

fn finish(engine: &MemoryEngine, executor: &mut UnitExecutor, id: InstanceId) {
    let handle = executor.instance(id).unwrap().engine_handle().unwrap();
    let item = engine
        .pending_work_items()
        .into_iter()
        .find(|w| w.handle == handle)
        .unwrap();
    engine.complete_work_item(item.id, Variables::new()).unwrap();
    executor.run_instance(id).unwrap();
    assert_eq!(executor.instance(id).unwrap().state(), State::Completed);
}

#[test]
fn test_completed_activity_is_dropped_from_watch_set() {
    let (engine, mut executor) = setup();
    let first = executor.run(Activity).unwrap();
    let second = executor.run(Activity).unwrap();
    let guard = executor.spawn_guard(Watcher::default(), [first, second]);
    assert!(executor.instance(guard).unwrap().is_guard());
    assert_eq!(executor.instance(first).unwrap().references(), &[guard]);

    finish(&engine, &mut executor, first);

    let g = executor.instance(guard).unwrap();
    assert_eq!(g.references(), &[second]);
    // leaving the activity gave the guard its first turn
    assert_eq!(g.state(), State::Suspended);
}

#[test]
fn test_watch_set_strictly_shrinks_and_state_is_kept() {
    let (engine, mut executor) = setup();
    let activities: Vec<_> = (0..3).map(|_| executor.submit(Activity).unwrap()).collect();
    let guard = executor.spawn_guard(Watcher::default(), activities.clone());
    executor.drive().unwrap();
    assert_eq!(executor.instance(guard).unwrap().state(), State::Suspended);

    let mut remaining = executor.instance(guard).unwrap().references().len();
    assert_eq!(remaining, 3);
    for id in &activities[..2] {
        finish(&engine, &mut executor, *id);
        let g = executor.instance(guard).unwrap();
        assert!(g.references().len() < remaining);
        assert!(!g.references().contains(id));
        assert_eq!(g.state(), State::Suspended);
        remaining = g.references().len();
    }
    assert_eq!(executor.instance(guard).unwrap().references(), &activities[2..]);
}

#[test]
fn test_guard_completes_on_unwatch_signals() {
    let (engine, mut executor) = setup();
    let activity = executor.run(Activity).unwrap();
    let guard = executor.spawn_guard(Watcher::default(), [activity]);
    executor.run_instance(guard).unwrap();
    assert_eq!(executor.instance(guard).unwrap().state(), State::Suspended);

    executor
        .signal(Signal::to_instance(guard, InstanceSignal::Unwatch(activity)))
        .unwrap();
    executor.run_instance(guard).unwrap();

    let g = executor.instance(guard).unwrap();
    assert_eq!(g.state(), State::Completed);
    assert!(g.references().is_empty());
    assert_eq!(g.unit_as::<Watcher>().unwrap().unwatched, 1);

    // the activity is untouched by its guard going away
    assert_eq!(executor.instance(activity).unwrap().state(), State::Suspended);
    assert_eq!(engine.pending_work_items().len(), 1);
}

#[test]
fn test_halted_activity_is_dropped_from_watch_set() {
    let (engine, mut executor) = setup();
    let activity = executor.run(Activity).unwrap();
    let guard = executor.spawn_guard(Watcher::default(), [activity]);

    executor
        .signal(Signal::to_instance(
            activity,
            InstanceSignal::notify("cancel", serde_json::Value::Null),
        ))
        .unwrap();
    executor.scheduler_mut().schedule(activity).unwrap();
    assert_eq!(executor.scheduler_mut().next(), Some(activity));
    executor.halt().unwrap();

    assert_eq!(executor.instance(activity).unwrap().state(), State::Completed);
    assert!(executor.instance(guard).unwrap().references().is_empty());
    assert!(engine.pending_work_items().is_empty());

    executor.drive().unwrap();
    assert_eq!(executor.instance(guard).unwrap().state(), State::Completed);
}

#[test]
fn test_suspended_guard_completes_when_last_activity_does() {
    let (engine, mut executor) = setup();
    let activity = executor.run(Activity).unwrap();
    let guard = executor.spawn_guard(Watcher::default(), [activity]);
    executor.run_instance(guard).unwrap();
    assert_eq!(executor.instance(guard).unwrap().state(), State::Suspended);

    finish(&engine, &mut executor, activity);

    let g = executor.instance(guard).unwrap();
    assert!(g.references().is_empty());
    assert_eq!(g.state(), State::Completed);
    assert_eq!(
        &g.history()[2..],
        &[
            State::Running,
            State::Suspended,
            State::Resuming,
            State::ReEntering,
            State::Running,
            State::Exiting,
            State::Completed
        ]
    );
    // no unwatch signal was needed, the watch-set was shrunk in place
    assert_eq!(g.unit_as::<Watcher>().unwrap().unwatched, 0);

    // running it again has nothing left to do
    executor.run_instance(guard).unwrap();
    assert_eq!(executor.instance(guard).unwrap().state(), State::Completed);
}

#[test]
fn test_unregister_signal_needs_a_current_instance() {
    let (_engine, mut executor) = setup();
    let err = executor
        .signal(Signal::to_scheduler(UnregisterGuard::new(InstanceId::new())))
        .unwrap_err();
    assert_eq!(err.as_label(), "no_current_instance");
}

#[test]
fn test_unwatch_on_activity_is_rejected() {
    let (_engine, mut executor) = setup();
    let activity = executor.run(Activity).unwrap();
    let err = executor
        .scheduler_mut()
        .instance_mut(activity)
        .unwrap()
        .unwatch(InstanceId::new())
        .unwrap_err();
    assert!(matches!(err, UnitError::NotAGuard(id) if id == activity));
}
