//! Globals persistence across runs: the JSON round-trip, `init` gating, and
//! the silent dropping of non-serializable values.

use pretty_assertions::assert_eq;
use serde_json::{Map as JsonMap, Value as Json};
use yqlang::{Action, BufferHost, EventMap, Program, Runner, RunnerConfig};

const COUNTER_SCRIPT: &str =
    "init counter = 0; if text { if text == \"水多少啦\" say \"已经水了\" + counter + \"条啦\"; counter += 1 }";

fn runner(src: &str) -> Runner {
    let program = Program::compile(src, "test.yq").expect("compile failed");
    Runner::new(program, RunnerConfig::default())
}

#[test]
fn event_driven_persistence() {
    let runner = runner(COUNTER_SCRIPT);
    let events = EventMap::new().with_text("水多少啦");

    let mut host = BufferHost::new();
    let first = runner.run_sync(&events, None, &mut host).unwrap();
    assert_eq!(first.actions, vec![Action::Text("已经水了0条啦".to_owned())]);
    assert_eq!(first.globals.get("counter"), Some(&Json::from(1)));

    let mut host = BufferHost::new();
    let second = runner.run_sync(&events, Some(&first.globals), &mut host).unwrap();
    assert_eq!(second.actions, vec![Action::Text("已经水了1条啦".to_owned())]);
    assert_eq!(second.globals.get("counter"), Some(&Json::from(2)));
}

#[test]
fn init_runs_only_on_first_run() {
    let runner = runner("init x = 100; x += 1; say x");
    let mut host = BufferHost::new();
    let first = runner.run_sync(&EventMap::new(), None, &mut host).unwrap();
    assert_eq!(first.actions, vec![Action::Text("101".to_owned())]);

    let mut host = BufferHost::new();
    let second = runner
        .run_sync(&EventMap::new(), Some(&first.globals), &mut host)
        .unwrap();
    assert_eq!(second.actions, vec![Action::Text("102".to_owned())]);
}

#[test]
fn round_trip_is_stable_for_an_empty_program() {
    // a program with no statements must hand back the globals it was given,
    // bit for bit modulo key order
    let runner = runner("");
    let mut prior = JsonMap::new();
    prior.insert("counter".to_owned(), Json::from(7));
    prior.insert("note".to_owned(), Json::String("水".to_owned()));
    prior.insert(
        "items".to_owned(),
        Json::Array(vec![Json::from(1), Json::Array(vec![Json::from(2)])]),
    );

    let mut host = BufferHost::new();
    let outcome = runner.run_sync(&EventMap::new(), Some(&prior), &mut host).unwrap();
    assert_eq!(outcome.error, None);
    assert_eq!(
        serde_json::to_string(&Json::Object(outcome.globals)).unwrap(),
        serde_json::to_string(&Json::Object(prior)).unwrap()
    );
}

#[test]
fn nested_containers_round_trip() {
    let runner1 = runner("data = { list: [1, \"two\", [3.5, null]], flag: true }");
    let mut host = BufferHost::new();
    let first = runner1.run_sync(&EventMap::new(), None, &mut host).unwrap();

    let runner2 = runner("say data.list[2][0]; say data.flag");
    let mut host = BufferHost::new();
    let second = runner2
        .run_sync(&EventMap::new(), Some(&first.globals), &mut host)
        .unwrap();
    assert_eq!(
        second.actions,
        vec![Action::Text("3.5".to_owned()), Action::Text("true".to_owned())]
    );
}

#[test]
fn ranges_round_trip_and_closures_drop() {
    let runner1 = runner("r = rangeInclusive(1, 3); f = { $0 }");
    let mut host = BufferHost::new();
    let first = runner1.run_sync(&EventMap::new(), None, &mut host).unwrap();
    assert!(first.globals.contains_key("r"));
    // closures have no JSON form and are dropped silently
    assert!(!first.globals.contains_key("f"));

    let runner2 = runner("total = 0; for v in r total += v; say total");
    let mut host = BufferHost::new();
    let second = runner2
        .run_sync(&EventMap::new(), Some(&first.globals), &mut host)
        .unwrap();
    assert_eq!(second.actions, vec![Action::Text("6".to_owned())]);
}

#[test]
fn unreferenced_persisted_names_pass_through() {
    let runner = runner("say \"ok\"");
    let mut prior = JsonMap::new();
    prior.insert("stale".to_owned(), Json::from(1));
    let mut host = BufferHost::new();
    let outcome = runner.run_sync(&EventMap::new(), Some(&prior), &mut host).unwrap();
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.actions, vec![Action::Text("ok".to_owned())]);
    // a script that never mentions `stale` must not destroy it
    assert_eq!(outcome.globals.get("stale"), Some(&Json::from(1)));
}

#[test]
fn compiled_programs_snapshot_and_reload() {
    let program = Program::compile(COUNTER_SCRIPT, "counter.yq").unwrap();
    let bytes = program.dump().unwrap();
    let restored = Program::load(&bytes).unwrap();

    let runner = Runner::new(restored, RunnerConfig::default());
    let mut host = BufferHost::new();
    let outcome = runner
        .run_sync(&EventMap::new().with_text("水多少啦"), None, &mut host)
        .unwrap();
    assert_eq!(outcome.actions, vec![Action::Text("已经水了0条啦".to_owned())]);
}
