//! The driver: runs a compiled program against one event under the
//! execution budget, buffering actions and persisting globals.
//!
//! A run proceeds as: deserialize prior globals into a fresh heap, bind the
//! event names the program references, execute the VM on a worker thread,
//! poll the shared action buffer every quantum, cancel once wall clock
//! exceeds `allowance + accumulated sleep` (or the total allowance), then
//! serialize globals and return. Actions drained in one batch preserve
//! program order; the buffer is the only object shared between the worker
//! and the driver.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::{Map as JsonMap, Value as Json};

use crate::{
    budget::Budget,
    bytecode::vm::Vm,
    errors::{DriverError, RuntimeError},
    globals::{Globals, deserialize_globals, serialize_globals, value_to_json},
    heap::Heap,
    host::{Action, EventMap, HostContext},
    program::Program,
    value::repr_string,
};

/// Driver configuration with the documented defaults.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunnerConfig {
    /// Polling cadence for draining buffered actions, in milliseconds.
    pub quantum_ms: u64,
    /// Per-run CPU budget excluding sleeps, in milliseconds.
    pub allowance_ms: u64,
    /// Per-run wall-clock hard cap (sleeps included), in milliseconds.
    pub total_allowance_ms: u64,
    /// Concurrent runs of the same compiled program.
    pub max_instances: usize,
    /// Maximum function-call depth.
    pub max_recursion_depth: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            quantum_ms: 100,
            allowance_ms: 800,
            total_allowance_ms: 3_600_000,
            max_instances: 10,
            max_recursion_depth: 300,
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn quantum_ms(mut self, value: u64) -> Self {
        self.quantum_ms = value;
        self
    }

    #[must_use]
    pub fn allowance_ms(mut self, value: u64) -> Self {
        self.allowance_ms = value;
        self
    }

    #[must_use]
    pub fn total_allowance_ms(mut self, value: u64) -> Self {
        self.total_allowance_ms = value;
        self
    }

    #[must_use]
    pub fn max_instances(mut self, value: usize) -> Self {
        self.max_instances = value;
        self
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, value: usize) -> Self {
        self.max_recursion_depth = value;
        self
    }
}

/// Everything a completed (or cancelled) run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Buffered actions in program order.
    pub actions: Vec<Action>,
    /// Serialized globals to persist for the next run.
    pub globals: JsonMap<String, Json>,
    /// The runtime error that aborted the run, if any. `Cancelled` means
    /// the budget ran out rather than a script bug.
    pub error: Option<RuntimeError>,
    /// The final module value as JSON, when it has a JSON form.
    pub value: Option<Json>,
    /// The final module value rendered for display.
    pub value_repr: String,
}

/// Outcome of the synchronous core, before the driver adds action
/// bookkeeping.
pub(crate) struct ScriptFinish {
    pub value: Option<Json>,
    pub value_repr: String,
    pub error: Option<RuntimeError>,
    pub globals: JsonMap<String, Json>,
}

/// Runs a program synchronously on the current thread. The shared core
/// behind both the threaded driver and the REPL.
pub(crate) fn execute_script<H: HostContext>(
    program: &Program,
    events: &EventMap,
    prior: Option<&JsonMap<String, Json>>,
    host: &mut H,
    budget: &mut Budget,
) -> ScriptFinish {
    let mut heap = Heap::new();
    let first_run = prior.is_none();
    let mut globals = match prior {
        Some(map) => deserialize_globals(map, program.symbols(), &mut heap),
        None => Globals::new(program.symbols().len()),
    };
    for (name, json) in events.iter() {
        if let Some(slot) = program.symbols().slot_of(name) {
            let value = crate::globals::json_to_value(json, &mut heap);
            globals.set(slot, value);
        }
    }

    let result = {
        let mut vm = Vm::new(program, &mut heap, &mut globals, host, budget, first_run);
        vm.run_module()
    };
    let (value, value_repr, error) = match result {
        Ok(value) => (
            value_to_json(&value, &heap, 0),
            repr_string(&value, &heap),
            None,
        ),
        Err(error) => (None, String::new(), Some(error)),
    };
    let stats = heap.stats();
    tracing::debug!(
        allocations = stats.allocations,
        approx_bytes = stats.approx_bytes,
        "heap at run end"
    );
    // globals are serialized on success and on cancellation alike; partial
    // state from an aborted run is still persisted
    let globals = serialize_globals(&globals, program.symbols(), &heap);
    ScriptFinish {
        value,
        value_repr,
        error,
        globals,
    }
}

/// Forwards actions into the shared buffer, delegating lookups to the
/// wrapped host.
struct DriverHost<H> {
    inner: H,
    queue: Arc<Mutex<Vec<Action>>>,
}

impl<H> DriverHost<H> {
    fn push(&self, action: Action) {
        self.queue.lock().expect("action buffer poisoned").push(action);
    }
}

impl<H: HostContext> HostContext for DriverHost<H> {
    fn say(&mut self, text: String) {
        self.push(Action::Text(text));
    }

    fn nudge(&mut self, target: i64) {
        self.push(Action::Nudge(target));
    }

    fn pic_save(&mut self, id: String) {
        self.push(Action::PicSave(id));
    }

    fn pic_send(&mut self, id: String) {
        self.push(Action::PicSend(id));
    }

    fn nickname(&mut self, id: i64) -> Option<String> {
        self.inner.nickname(id)
    }
}

/// Decrements the active-instance counter even if the driver unwinds.
struct InstanceGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives runs of one compiled program.
///
/// Cloning is cheap; clones share the compiled program and the
/// concurrent-instance counter.
#[derive(Clone)]
pub struct Runner {
    program: Arc<Program>,
    config: RunnerConfig,
    active: Arc<AtomicUsize>,
}

impl Runner {
    #[must_use]
    pub fn new(program: Program, config: RunnerConfig) -> Self {
        Self {
            program: Arc::new(program),
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs the program against one event, buffering all actions into the
    /// returned outcome.
    ///
    /// # Errors
    /// Returns [`DriverError::TooManyInstances`] when the concurrent-run cap
    /// is already reached.
    pub fn run<H: HostContext + 'static>(
        &self,
        events: EventMap,
        prior: Option<JsonMap<String, Json>>,
        host: H,
    ) -> Result<RunOutcome, DriverError> {
        self.run_with_sink(events, prior, host, |_| {})
    }

    /// Like [`Runner::run`], additionally handing each drained batch to
    /// `sink` at quantum cadence. Batches never reorder actions.
    pub fn run_with_sink<H: HostContext + 'static>(
        &self,
        events: EventMap,
        prior: Option<JsonMap<String, Json>>,
        host: H,
        mut sink: impl FnMut(&[Action]),
    ) -> Result<RunOutcome, DriverError> {
        let _guard = self.acquire_instance()?;

        let mut budget = Budget::new(self.config.max_recursion_depth);
        let cancel = budget.cancel_handle();
        let sleep_ms = budget.sleep_handle();
        let queue = Arc::new(Mutex::new(Vec::new()));

        let program = Arc::clone(&self.program);
        let worker_queue = Arc::clone(&queue);
        tracing::debug!(script = %program.source_name(), "starting run");
        let worker = std::thread::spawn(move || {
            let mut host = DriverHost {
                inner: host,
                queue: worker_queue,
            };
            execute_script(&program, &events, prior.as_ref(), &mut host, &mut budget)
        });

        let started = Instant::now();
        let quantum = Duration::from_millis(self.config.quantum_ms.max(1));
        let allowance = Duration::from_millis(self.config.allowance_ms);
        let total_allowance = Duration::from_millis(self.config.total_allowance_ms);
        let mut actions = Vec::new();

        while !worker.is_finished() {
            std::thread::sleep(quantum);
            drain(&queue, &mut actions, &mut sink);

            let elapsed = started.elapsed();
            let slept = Duration::from_millis(sleep_ms.load(Ordering::Relaxed));
            if elapsed > total_allowance {
                tracing::debug!(script = %self.program.source_name(), "total allowance exhausted, cancelling");
                cancel.store(true, Ordering::Relaxed);
            } else if elapsed > allowance + slept {
                tracing::debug!(script = %self.program.source_name(), "allowance exhausted, cancelling");
                cancel.store(true, Ordering::Relaxed);
            }
        }

        let finish = worker.join().expect("script worker panicked");
        drain(&queue, &mut actions, &mut sink);
        tracing::debug!(
            script = %self.program.source_name(),
            actions = actions.len(),
            cancelled = finish.error.as_ref().is_some_and(RuntimeError::is_cancelled),
            "run finished"
        );

        Ok(RunOutcome {
            actions,
            globals: finish.globals,
            error: finish.error,
            value: finish.value,
            value_repr: finish.value_repr,
        })
    }

    /// Runs synchronously on the calling thread with a deadline budget
    /// instead of a polling driver. Actions still arrive in order.
    pub fn run_sync<H: HostContext>(
        &self,
        events: &EventMap,
        prior: Option<&JsonMap<String, Json>>,
        host: &mut H,
    ) -> Result<RunOutcome, DriverError> {
        let _guard = self.acquire_instance()?;
        let mut budget = Budget::with_allowance(
            self.config.max_recursion_depth,
            Duration::from_millis(self.config.allowance_ms),
        );
        let queue = Arc::new(Mutex::new(Vec::new()));
        let mut driver_host = DriverHost {
            inner: host,
            queue: Arc::clone(&queue),
        };
        let finish = execute_script(&self.program, events, prior, &mut driver_host, &mut budget);
        let actions = std::mem::take(&mut *queue.lock().expect("action buffer poisoned"));
        Ok(RunOutcome {
            actions,
            globals: finish.globals,
            error: finish.error,
            value: finish.value,
            value_repr: finish.value_repr,
        })
    }

    fn acquire_instance(&self) -> Result<InstanceGuard, DriverError> {
        let prev = self.active.fetch_add(1, Ordering::SeqCst);
        if prev >= self.config.max_instances {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(DriverError::TooManyInstances {
                limit: self.config.max_instances,
            });
        }
        Ok(InstanceGuard {
            active: Arc::clone(&self.active),
        })
    }
}

fn drain(queue: &Arc<Mutex<Vec<Action>>>, into: &mut Vec<Action>, sink: &mut impl FnMut(&[Action])) {
    let batch = std::mem::take(&mut *queue.lock().expect("action buffer poisoned"));
    if !batch.is_empty() {
        sink(&batch);
        into.extend(batch);
    }
}
