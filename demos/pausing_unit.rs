//! A unit whose process waits on a human task, resumed from another thread.
//!
//! This demo shows:
//! - Defining a unit with a variable binding
//! - Registering process definitions on the in-memory engine
//! - A run that suspends on a work item
//! - Completing the work item on a worker thread and resuming the unit
//! - A guard watching the unit until it completes

use serde_json::json;
use std::sync::Arc;
use std::thread;
use unitary::prelude::*;

// ============================================================================
// Step 1: The unit
// ============================================================================

/// An expense claim waiting for approval.
struct ExpenseClaim {
    amount: i64,
    approved: bool,
}

impl Unit for ExpenseClaim {
    fn identity(&self) -> String {
        "expense_claim".to_string()
    }

    fn on_enter(&mut self) {
        println!("  claim of {} submitted", self.amount);
    }

    fn on_suspend(&mut self) {
        println!("  waiting for a reviewer...");
    }

    fn on_re_enter(&mut self) {
        println!("  back from review");
    }

    fn on_signal(&mut self, signal: &InstanceSignal) {
        if let InstanceSignal::Notify { event, payload } = signal {
            println!("  signal {}: {}", event, payload);
        }
    }

    fn on_end(&mut self) {
        println!("  claim closed, approved = {}", self.approved);
    }

    fn bindings(&self) -> Vec<UnitBinding> {
        vec![
            UnitBinding::new(
                "amount",
                |c: &ExpenseClaim| json!(c.amount),
                |c: &mut ExpenseClaim, v| c.amount = v.as_i64().unwrap_or(c.amount),
            ),
            UnitBinding::new(
                "approved",
                |c: &ExpenseClaim| json!(c.approved),
                |c: &mut ExpenseClaim, v| c.approved = v.as_bool().unwrap_or(false),
            ),
        ]
    }
}

/// Watches claims and reports when it is done.
struct Auditor;

impl Unit for Auditor {
    fn identity(&self) -> String {
        "auditor".to_string()
    }

    fn on_end(&mut self) {
        println!("  auditor done");
    }
}

fn main() -> Result<(), UnitError> {
    println!("=== Pausing unit demo ===\n");

    // ============================================================================
    // Step 2: The engine
    // ============================================================================

    let engine = Arc::new(MemoryEngine::new());
    engine.register(
        ProcessDefinition::new("expense_claim")
            .script(|vars| {
                let amount = vars.get("amount").and_then(|v| v.as_i64()).unwrap_or(0);
                vars.insert("needs_review".into(), json!(amount > 100));
                Ok(())
            })
            .work_item("Human Task"),
    );

    let mut executor = UnitExecutor::new(engine.clone());

    // ============================================================================
    // Step 3: Run until the process waits
    // ============================================================================

    println!("Running claim:");
    let claim = executor.run(ExpenseClaim {
        amount: 250,
        approved: false,
    })?;
    let auditor = executor.spawn_guard(Auditor, [claim]);
    println!(
        "  -> claim is {}, auditor is {}\n",
        executor.instance(claim).map(|i| i.state()).unwrap_or(State::Completed),
        executor.instance(auditor).map(|i| i.state()).unwrap_or(State::Completed),
    );

    // ============================================================================
    // Step 4: A reviewer approves on another thread
    // ============================================================================

    println!("Reviewer approves:");
    let remote = engine.clone();
    let reviewer = thread::spawn(move || -> Result<(), EngineError> {
        for item in remote.pending_work_items() {
            let mut results = Variables::new();
            results.insert("approved".into(), json!(true));
            remote.complete_work_item(item.id, results)?;
        }
        Ok(())
    });
    match reviewer.join() {
        Ok(result) => result?,
        Err(_) => println!("  reviewer thread panicked"),
    }

    // ============================================================================
    // Step 5: Resume
    // ============================================================================

    executor.run_instance(claim)?;
    if let Some(unit) = executor.instance(claim).and_then(|i| i.unit_as::<ExpenseClaim>()) {
        println!("  -> approved = {}", unit.approved);
    }

    // The auditor got its turn right after the claim completed.
    if let Some(inst) = executor.instance(auditor) {
        println!("  -> auditor is {} with history {:?}", inst.state(), inst.history());
    }

    println!("\n=== Demo complete ===");
    Ok(())
}
