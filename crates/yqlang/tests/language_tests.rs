//! End-to-end language behavior: the core scenarios plus the semantic
//! contracts around reference/value semantics, slices, short-circuiting,
//! closures, and iteration order.

use pretty_assertions::assert_eq;
use serde_json::{Map as JsonMap, Value as Json};
use yqlang::{Action, BufferHost, EventMap, Program, RunOutcome, Runner, RunnerConfig};

fn run_with(src: &str, events: EventMap, prior: Option<JsonMap<String, Json>>) -> RunOutcome {
    let program = Program::compile(src, "test.yq").expect("compile failed");
    let runner = Runner::new(program, RunnerConfig::default());
    let mut host = BufferHost::new();
    runner
        .run_sync(&events, prior.as_ref(), &mut host)
        .expect("driver refused the run")
}

fn run(src: &str) -> RunOutcome {
    run_with(src, EventMap::new(), None)
}

fn texts(outcome: &RunOutcome) -> Vec<String> {
    outcome
        .actions
        .iter()
        .map(|action| match action {
            Action::Text(text) => text.clone(),
            other => panic!("expected only text actions, got {other:?}"),
        })
        .collect()
}

#[track_caller]
fn expect_texts(src: &str, expected: &[&str]) {
    let outcome = run(src);
    assert_eq!(outcome.error, None, "run failed: {:?}", outcome.error);
    assert_eq!(texts(&outcome), expected);
}

// --- core scenarios ---

#[test]
fn factorization_loop() {
    expect_texts(
        "for i in range(20) { j = i; while j < 20 { j += 1; if i*j == 221 { say \"221 = \" + i + \" * \" + j; break } } }",
        &["221 = 13 * 17"],
    );
}

#[test]
fn filter_map_pipeline() {
    expect_texts(
        "say [1,2,3,4,5].filter({ $0 % 2 == 0 }).map({ $0*$0 })",
        &["[4, 16]"],
    );
}

#[test]
fn object_and_bound_methods() {
    expect_texts(
        "obj = { content: 1, show: func() say this.content }; obj.content = [114, 514, 1919, 810]; obj.show()",
        &["[114, 514, 1919, 810]"],
    );
}

#[test]
fn nested_destructured_slice_assign() {
    expect_texts(
        "[a,b] = [[1,[2,3,4]], [\"ahaha\",\"wowow\"]]; [a[1][1:3], b[1:2][0][1:4]] = [[5,6],\"www\"]; say a; say b",
        &["[1, [2, 5, 6]]", "[\"ahaha\", \"wwwww\"]"],
    );
}

// --- reference vs value semantics ---

#[test]
fn lists_share_on_assignment() {
    expect_texts("a = [1,2]; b = a; b[0] = 9; say a", &["[9, 2]"]);
}

#[test]
fn primitives_copy_on_assignment() {
    expect_texts("a = 1; b = a; b = 9; say a", &["1"]);
}

#[test]
fn slice_assign_preserves_length_when_lengths_match() {
    expect_texts("a = [1,2,3,4]; a[1:3] = [9,8]; say a", &["[1, 9, 8, 4]"]);
}

#[test]
fn string_slice_assign() {
    expect_texts("s = \"apple\"; s[3:4] = \"rov\"; say s", &["approve"]);
}

#[test]
fn string_index_is_readable_and_assignable() {
    expect_texts("s = \"apple\"; say s[0]; s[0] = \"A\"; say s", &["a", "Apple"]);
}

#[test]
fn negative_indices_count_from_the_end() {
    expect_texts("a = [1,2,3]; say a[-1]; a[-1] = 9; say a", &["3", "[1, 2, 9]"]);
}

// --- short-circuit evaluation ---

#[test]
fn short_circuit_skips_rhs() {
    // `boom` is an unbound global holding null; calling it would be a type
    // error, so these only pass if the right side never evaluates
    expect_texts("x = false && boom(); say x", &["false"]);
    expect_texts("y = true || boom(); say y", &["true"]);
}

#[test]
fn and_or_produce_booleans() {
    expect_texts("say 1 && 2; say 0 || 3; say 0 && 2; say \"\" || \"\"", &["true", "true", "false", "false"]);
}

// --- destructuring ---

#[test]
fn shorter_rhs_leaves_tail_unbound() {
    expect_texts("[a, b, c] = [7]; say a; say b; say c", &["7", "null", "null"]);
}

#[test]
fn destructuring_non_list_is_a_pattern_error() {
    let outcome = run("[a, b] = 5");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::PatternMatch { .. }));
}

// --- iteration order ---

#[test]
fn for_visits_every_element_in_order() {
    expect_texts("for x in [3, 1, 2] say x", &["3", "1", "2"]);
    expect_texts("for c in \"水多少\" say c", &["水", "多", "少"]);
    expect_texts("s = \"\"; for i in range(1, 4) s += i; say s", &["123"]);
    expect_texts(
        "o = { b: 1, a: 2 }; for [k, v] in o say k + \"=\" + v",
        &["b=1", "a=2"],
    );
}

#[test]
fn for_destructures_pairs() {
    expect_texts(
        "total = 0; for [i, x] in [[1, 10], [2, 20]] total += i * x; say total",
        &["50"],
    );
}

#[test]
fn break_and_continue() {
    expect_texts(
        "out = \"\"; for i in range(10) { if i == 2 continue; if i == 5 break; out += i }; say out",
        &["0134"],
    );
}

// --- closures and captures ---

#[test]
fn closures_capture_by_shared_reference() {
    expect_texts(
        "func counter() { c = 0; return { -> c += 1; c } }\nm = counter(); m(); m(); say m()",
        &["3"],
    );
}

#[test]
fn two_closures_share_one_cell() {
    expect_texts(
        "func pair() { c = 0; return [{ -> c += 10; c }, { -> c }] }\n[bump, read] = pair(); bump(); say read()",
        &["10"],
    );
}

#[test]
fn functions_return_last_expression() {
    expect_texts("func sign(x) { if x < 0 { -1 } else { 1 } }\nsay sign(-5); say sign(5)", &["-1", "1"]);
}

#[test]
fn args_list_and_positional_args() {
    expect_texts("f = { $0 + $1 }; say f(40, 2)", &["42"]);
    expect_texts("f = { $1 }; say f(1)", &["null"]);
    expect_texts("g = { $.length() }; say g(1, 2, 3)", &["3"]);
}

#[test]
fn recursion_works_within_the_limit() {
    expect_texts(
        "func fact(n) { if n <= 1 return 1; return n * fact(n - 1) }\nsay fact(10)",
        &["3628800"],
    );
}

#[test]
fn runaway_recursion_is_capped() {
    let outcome = run("func f() { return f() }\nf()");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::RecursionTooDeep { .. }));
}

// --- errors ---

#[test]
fn divide_by_zero() {
    let outcome = run("say 1 / 0");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::DivideByZero));
}

#[test]
fn index_out_of_range() {
    let outcome = run("a = [1]; say a[5]");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::IndexOutOfRange { .. }));
}

#[test]
fn unknown_method_is_no_such_method() {
    let outcome = run("\"abc\".frobnicate()");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::NoSuchMethod { .. }));
}

#[test]
fn calling_a_non_procedure_is_a_type_error() {
    let outcome = run("x = 5; x()");
    let err = outcome.error.expect("expected a runtime error");
    assert!(matches!(err.kind, yqlang::RuntimeErrorKind::TypeMismatch { .. }));
}

#[test]
fn partial_output_survives_errors() {
    let outcome = run("say \"before\"; say 1 / 0");
    assert_eq!(texts(&outcome), ["before"]);
    assert!(outcome.error.is_some());
}

// --- builtins ---

#[test]
fn string_and_list_builtins() {
    expect_texts("say \"a,b,c\".split(\",\")", &["[\"a\", \"b\", \"c\"]"]);
    expect_texts("say [1, 2, 3].join(\"-\")", &["1-2-3"]);
    expect_texts("say \"hello\".length(); say length(\"hello\")", &["5", "5"]);
    expect_texts("say [1, 2, 3].reversed(); say \"abc\".reversed()", &["[3, 2, 1]", "cba"]);
    expect_texts("say \"banana\".find(\"na\"); say [5, 6].find(7)", &["2", "-1"]);
    expect_texts("say \"banana\".findAll(\"na\")", &["[2, 4]"]);
    expect_texts("say [1, 2, 3].sum(); say [1, 2, 3].enumerated()", &["6", "[[0, 1], [1, 2], [2, 3]]"]);
    expect_texts("say [3, 1, 2].max(); say [3, 1, 2].min(); say max(4, 9)", &["3", "1", "9"]);
    expect_texts("say 2 in [1, 2]; say \"ell\" in \"hello\"; say \"a\" in { a: 1 }", &["true", "true", "true"]);
}

#[test]
fn sorted_with_and_without_comparator() {
    expect_texts("say [3, 1, 2].sorted()", &["[1, 2, 3]"]);
    // comparator: truthy iff the first argument comes after the second
    expect_texts("say [3, 1, 2].sorted({ $0 < $1 })", &["[3, 2, 1]"]);
    expect_texts("say [\"pear\", \"fig\"].sorted()", &["[\"fig\", \"pear\"]"]);
}

#[test]
fn functional_builtins_over_ranges() {
    expect_texts("say range(5).map({ $0 * 2 })", &["[0, 2, 4, 6, 8]"]);
    expect_texts("say rangeInclusive(1, 4).reduce(0, { $0 + $1 })", &["10"]);
    expect_texts("say range(\"a\", \"e\").map({ $0 })", &["[\"a\", \"b\", \"c\", \"d\"]"]);
}

#[test]
fn conversion_builtins() {
    expect_texts("say number(\"42\") + 1; say num(\"1.5\")", &["43", "1.5"]);
    expect_texts("say string(42) + \"!\"; say str(1.5)", &["42!", "1.5"]);
    expect_texts("say integer(3.9); say float(2)", &["3", "2.0"]);
    expect_texts("say boolean(\"\"); say bool(5)", &["false", "true"]);
    expect_texts("say abs(-7); say pow(2, 10); say ord(\"A\"); say chr(66)", &["7", "1024", "65", "B"]);
    expect_texts("say object([[\"a\", 1], [\"b\", 2]])", &["{a: 1, b: 2}"]);
}

#[test]
fn regex_builtins() {
    expect_texts("say \"foo123bar\".match(re(\"[0-9]+\"))", &["123"]);
    expect_texts("say \"a1b22c\".matchAll(re(\"[0-9]+\"))", &["[\"1\", \"22\"]"]);
    expect_texts("say \"12345\".matchEntire(re(\"[0-9]+\")); say \"12a\".matchEntire(re(\"[0-9]+\"))", &["12345", "null"]);
    expect_texts("say \"a-b-c\".replace(\"-\", \"+\")", &["a+b+c"]);
    expect_texts("say \"Hello\".match(re(\"hello\", \"i\"))", &["Hello"]);
}

#[test]
fn arithmetic_coercions() {
    expect_texts("say 1 + 2.5; say true + 1; say \"ab\" * 3; say [0] * 2", &["3.5", "2", "ababab", "[0, 0]"]);
    expect_texts("say 7 / 2; say 7.0 / 2; say 7 % 3", &["3", "3.5", "1"]);
    expect_texts("say \"v\" + 1 + 2", &["v12"]);
}

#[test]
fn structural_equality() {
    expect_texts("say [1, [2]] == [1, [2]]; say { a: 1 } == { a: 1 }; say 1 == 1.0", &["true", "true", "true"]);
    expect_texts("say [1] != [2]", &["true"]);
}

#[test]
fn method_dispatch_on_primitives() {
    expect_texts("say 5.string() + \"!\"", &["5!"]);
    expect_texts("n = 255; say n.string().length()", &["3"]);
}

// --- events and host actions ---

#[test]
fn event_bindings_and_actions() {
    let events = EventMap::new().with_text("ping").with_sender(99);
    let outcome = run_with("if text == \"ping\" { say \"pong\"; nudge sender }", events, None);
    assert_eq!(
        outcome.actions,
        vec![Action::Text("pong".to_owned()), Action::Nudge(99)]
    );
}

#[test]
fn absent_events_read_null() {
    expect_texts("if text { say \"has text\" } else { say \"quiet\" }", &["quiet"]);
}

#[test]
fn picture_actions_keep_order() {
    let outcome = run("picsave \"img-1\"; say \"between\"; picsend \"img-1\"");
    assert_eq!(
        outcome.actions,
        vec![
            Action::PicSave("img-1".to_owned()),
            Action::Text("between".to_owned()),
            Action::PicSend("img-1".to_owned()),
        ]
    );
}

#[test]
fn nickname_lookup_goes_through_the_host() {
    let program = Program::compile("say getNickname(7) + \" / \" + getNickname(8)", "test.yq").unwrap();
    let runner = Runner::new(program, RunnerConfig::default());
    let mut host = BufferHost::new();
    host.add_nickname(7, "Ed");
    let outcome = runner.run_sync(&EventMap::new(), None, &mut host).unwrap();
    assert_eq!(texts(&outcome), ["Ed / 8"]);
}

// --- module result value ---

#[test]
fn final_expression_value_is_reported() {
    let outcome = run("1 + 2");
    assert_eq!(outcome.value_repr, "3");
    assert_eq!(outcome.value, Some(serde_json::json!(3)));

    let outcome = run("x = 1");
    assert_eq!(outcome.value_repr, "null");
}
