//! Driver behavior: budget enforcement, sleep accounting, the
//! concurrent-instance cap, and batched action draining.

use std::time::{Duration, Instant};

use yqlang::{Action, BufferHost, DriverError, EventMap, Program, Runner, RunnerConfig};

fn runner(src: &str, config: RunnerConfig) -> Runner {
    let program = Program::compile(src, "test.yq").expect("compile failed");
    Runner::new(program, config)
}

#[test]
fn infinite_loop_is_cancelled_near_the_allowance() {
    let config = RunnerConfig::default().allowance_ms(120).quantum_ms(20);
    let runner = runner("while true {}", config);
    let started = Instant::now();
    let outcome = runner.run(EventMap::new(), None, BufferHost::new()).unwrap();
    let elapsed = started.elapsed();

    let err = outcome.error.expect("expected cancellation");
    assert!(err.is_cancelled(), "got {err:?}");
    assert!(outcome.actions.is_empty());
    // cancelled within a few quanta of the allowance
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
fn output_before_the_loop_is_preserved_on_cancel() {
    let config = RunnerConfig::default().allowance_ms(80).quantum_ms(20);
    let runner = runner("say \"started\"; while true {}", config);
    let outcome = runner.run(EventMap::new(), None, BufferHost::new()).unwrap();
    assert!(outcome.error.is_some_and(|e| e.is_cancelled()));
    assert_eq!(outcome.actions, vec![Action::Text("started".to_owned())]);
}

#[test]
fn sleep_does_not_consume_the_allowance() {
    // the sleep is longer than the allowance; only actual CPU time counts
    let config = RunnerConfig::default().allowance_ms(100).quantum_ms(20);
    let runner = runner("sleep(250); say \"woke\"", config);
    let outcome = runner.run(EventMap::new(), None, BufferHost::new()).unwrap();
    assert_eq!(outcome.error, None, "sleep must not be billed as CPU time");
    assert_eq!(outcome.actions, vec![Action::Text("woke".to_owned())]);
}

#[test]
fn sync_runs_enforce_the_deadline_too() {
    let config = RunnerConfig::default().allowance_ms(80);
    let runner = runner("while true {}", config);
    let mut host = BufferHost::new();
    let outcome = runner.run_sync(&EventMap::new(), None, &mut host).unwrap();
    assert!(outcome.error.is_some_and(|e| e.is_cancelled()));
}

#[test]
fn instance_cap_rejects_extra_starts() {
    let config = RunnerConfig::default().max_instances(0);
    let runner = runner("say 1", config);
    let mut host = BufferHost::new();
    let err = runner.run_sync(&EventMap::new(), None, &mut host).unwrap_err();
    assert_eq!(err, DriverError::TooManyInstances { limit: 0 });
}

#[test]
fn instances_are_released_after_each_run() {
    let config = RunnerConfig::default().max_instances(1);
    let runner = runner("say 1", config);
    for _ in 0..3 {
        let mut host = BufferHost::new();
        let outcome = runner.run_sync(&EventMap::new(), None, &mut host).unwrap();
        assert_eq!(outcome.error, None);
    }
}

#[test]
fn sink_receives_batches_in_order() {
    let config = RunnerConfig::default().quantum_ms(10);
    let runner = runner("for i in range(5) say i", config);
    let mut seen = Vec::new();
    let outcome = runner
        .run_with_sink(EventMap::new(), None, BufferHost::new(), |batch| {
            seen.extend(batch.to_vec());
        })
        .unwrap();
    assert_eq!(outcome.error, None);
    let expected: Vec<Action> = (0..5).map(|i| Action::Text(i.to_string())).collect();
    assert_eq!(seen, expected);
    assert_eq!(outcome.actions, expected);
}

#[test]
fn recursion_limit_is_configurable() {
    let config = RunnerConfig::default().max_recursion_depth(10);
    let runner = runner("func f(n) { return f(n + 1) }\nf(0)", config);
    let mut host = BufferHost::new();
    let outcome = runner.run_sync(&EventMap::new(), None, &mut host).unwrap();
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::RecursionTooDeep { limit: 10 }));
}
