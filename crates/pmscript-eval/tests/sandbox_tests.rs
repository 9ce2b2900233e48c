//! Integration tests for the pmscript sandbox.
//!
//! Tests key engine features:
//! - assertion polarity and predicate semantics
//! - per-test isolation and result ordering
//! - global script failures (syntax, uncaught throws, budgets)
//! - the pm.response / pm.environment facade
//! - variable round-trips and environment merging

use pmscript_eval::{
    replace_variables, run_tests, test_script, Environment, Exchange, LogLevel, RunOutcome,
    RunnerConfig, Sandbox, ScriptEvent, TestResult, VariableStore, SCRIPT_RESULT_NAME,
};
use serde_json::json;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn exchange() -> Exchange {
    Exchange::json(
        200,
        "OK",
        json!({ "success": "OK", "count": 3, "user": { "id": 7, "tags": ["a", "b"] } }),
    )
    .with_header("Content-Type", "application/json")
    .with_header("X-Request-Id", "abc-123")
}

fn run(script: &str) -> RunOutcome {
    run_tests(script, &exchange(), VariableStore::new())
}

fn vars(pairs: &[(&str, &str)]) -> VariableStore {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

/// `(name, passed)` pairs, for compact assertions on many results.
fn verdicts(outcome: &RunOutcome) -> Vec<(&str, bool)> {
    outcome
        .test_results
        .iter()
        .map(|r| (r.name.as_str(), r.passed))
        .collect()
}

fn error_of<'a>(outcome: &'a RunOutcome, name: &str) -> &'a str {
    outcome
        .test_results
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no result named {name}"))
        .error
        .as_deref()
        .unwrap_or_else(|| panic!("{name} has no error"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Assertions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn negation_flips_every_predicate() {
    let outcome = run(r#"
        pm.test("ok", () => pm.expect(1).to.be.ok());
        pm.test("not ok", () => pm.expect(1).to.not.be.ok());
        pm.test("falsy not ok", () => pm.expect(0).not.to.be.ok());
        pm.test("equal", () => pm.expect("a").to.equal("a"));
        pm.test("not equal", () => pm.expect("a").to.not.equal("a"));
        pm.test("above", () => pm.expect(5).to.be.above(3));
        pm.test("not above", () => pm.expect(5).to.not.be.above(3));
        pm.test("type", () => pm.expect("s").to.be.a("string"));
        pm.test("not type", () => pm.expect("s").to.not.be.a("string"));
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![
            ("ok", true),
            ("not ok", false),
            ("falsy not ok", true),
            ("equal", true),
            ("not equal", false),
            ("above", true),
            ("not above", false),
            ("type", true),
            ("not type", false),
        ]
    );
    assert_eq!(error_of(&outcome, "not ok"), "expected 1 not to be truthy");
    assert_eq!(error_of(&outcome, "not equal"), r#"expected "a" not to equal "a""#);
}

#[test]
fn not_does_not_mutate_the_original_target() {
    let outcome = run(r#"
        pm.test("independent", () => {
            const target = pm.expect(1);
            const negated = target.not;
            target.to.equal(1);
            negated.to.equal(2);
        });
    "#);
    assert_eq!(verdicts(&outcome), vec![("independent", true)]);
}

#[test]
fn javascript_truthiness() {
    let outcome = run(r#"
        pm.test("empty array", () => pm.expect([]).to.be.ok());
        pm.test("empty object", () => pm.expect({}).to.be.ok());
        pm.test("empty string", () => pm.expect("").to.not.be.ok());
        pm.test("nan", () => pm.expect(NaN).to.not.be.ok());
        pm.test("undefined", () => pm.expect(undefined).to.not.be.ok());
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

#[test]
fn empty_passes_fails_and_rejects_unsupported_types() {
    let outcome = run(r#"
        pm.test("non-empty array", () => pm.expect([1, 2]).to.not.be.empty());
        pm.test("empty array", () => pm.expect([]).to.be.empty());
        pm.test("one item", () => pm.expect([1]).to.be.empty());
        pm.test("number", () => pm.expect(5).to.be.empty());
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![
            ("non-empty array", true),
            ("empty array", true),
            ("one item", false),
            ("number", false),
        ]
    );
    assert_eq!(error_of(&outcome, "one item"), "expected [1] to be empty");
    assert_eq!(
        error_of(&outcome, "number"),
        "'empty' assertion is not supported for type number"
    );
}

#[test]
fn usage_errors_are_distinct_from_assertion_failures() {
    let outcome = run(r#"
        try { pm.expect(5).to.be.empty(); } catch (e) { pm.test(e.name, () => {}); }
        try { pm.expect([1]).to.be.empty(); } catch (e) { pm.test(e.name, () => {}); }
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![("UsageError", true), ("AssertionError", true)]
    );
}

#[test]
fn usage_error_at_top_level_is_a_script_error() {
    let outcome = run("pm.expect(true).to.be.empty();");
    assert_eq!(outcome.test_results.len(), 1);
    assert_eq!(outcome.test_results[0].name, SCRIPT_RESULT_NAME);
    assert_eq!(
        outcome.test_results[0].error.as_deref(),
        Some("Global script error: 'empty' assertion is not supported for type boolean")
    );
}

#[test]
fn property_chains_against_the_original_object() {
    let outcome = run(r#"
        pm.test("object", () => pm.expect({ a: 1 }).to.have.property("a").to.be.an("object"));
        pm.test("value", () => pm.expect({ a: 1 }).to.have.property("a").to.be.a("number"));
        pm.test("missing", () => pm.expect({ a: 1 }).to.have.property("b"));
        pm.test("not missing", () => pm.expect({ a: 1 }).to.not.have.property("b"));
        pm.test("null object", () => pm.expect(null).to.have.property("a"));
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![
            ("object", true),
            ("value", false),
            ("missing", false),
            ("not missing", true),
            ("null object", false),
        ]
    );
    assert_eq!(
        error_of(&outcome, "value"),
        r#"expected {"a":1} to be a number, but got object"#
    );
    assert_eq!(
        error_of(&outcome, "missing"),
        r#"expected {"a":1} to have property 'b'"#
    );
}

#[test]
fn eql_is_structural_and_equal_is_identity() {
    let outcome = run(r#"
        const jsonData = pm.response.json();
        pm.test("eql string", () => pm.expect(jsonData.success).to.eql("OK"));
        pm.test("equal string", () => pm.expect(jsonData.success).to.equal("OK"));
        pm.test("eql objects", () => pm.expect({ x: [1, 2] }).to.eql({ x: [1, 2] }));
        pm.test("equal objects", () => pm.expect({ x: [1, 2] }).to.equal({ x: [1, 2] }));
        const same = { x: 1 };
        pm.test("equal same object", () => pm.expect(same).to.equal(same));
        pm.test("eql key order", () => pm.expect({ a: 1, b: 2 }).to.eql({ b: 2, a: 1 }));
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![
            ("eql string", true),
            ("equal string", true),
            ("eql objects", true),
            ("equal objects", false),
            ("equal same object", true),
            ("eql key order", false),
        ]
    );
    assert_eq!(
        error_of(&outcome, "equal objects"),
        r#"expected {"x":[1,2]} to equal {"x":[1,2]}"#
    );
}

#[test]
fn null_is_a_property_check() {
    let outcome = run(r#"
        pm.test("null", () => pm.expect(null).to.be.null);
        pm.test("not null", () => pm.expect(0).to.not.be.null);
        pm.test("zero is not null", () => pm.expect(0).to.be.null);
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![("null", true), ("not null", true), ("zero is not null", false)]
    );
    assert_eq!(error_of(&outcome, "zero is not null"), "expected 0 to be null");
}

#[test]
fn type_tags() {
    let outcome = run(r#"
        pm.test("array", () => pm.expect([]).to.be.an("array"));
        pm.test("null", () => pm.expect(null).to.be.a("null"));
        pm.test("object", () => pm.expect({}).to.be.an("object"));
        pm.test("number", () => pm.expect(1.5).to.be.a("number"));
        pm.test("boolean", () => pm.expect(false).to.be.a("boolean"));
        pm.test("undefined", () => pm.expect(undefined).to.be.an("undefined"));
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

#[test]
fn above_requires_a_number() {
    let outcome = run(r#"
        pm.test("string", () => pm.expect("10").to.be.above(3));
        pm.test("count", () => pm.expect(pm.response.json().count).to.be.above(2));
    "#);
    assert_eq!(verdicts(&outcome), vec![("string", false), ("count", true)]);
    assert_eq!(error_of(&outcome, "string"), "expected 10 to be above 3");
}

// ══════════════════════════════════════════════════════════════════════════════
// Test registration
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn failing_test_does_not_stop_the_next_one() {
    let outcome = run(r#"
        pm.test("t1", () => { throw new Error("boom"); });
        pm.test("t2", () => {});
    "#);
    assert_eq!(
        outcome.test_results,
        vec![TestResult::fail("t1", "boom"), TestResult::pass("t2")]
    );
}

#[test]
fn thrown_non_errors_are_stringified() {
    let outcome = run(r#"
        pm.test("string", () => { throw "plain"; });
        pm.test("number", () => { throw 42; });
        pm.test("object", () => { throw { code: 1 }; });
        pm.test("type error", () => { null.x; });
    "#);
    assert_eq!(error_of(&outcome, "string"), "plain");
    assert_eq!(error_of(&outcome, "number"), "42");
    assert_eq!(error_of(&outcome, "object"), "[object Object]");
    assert_eq!(
        error_of(&outcome, "type error"),
        "Cannot read properties of null (reading 'x')"
    );
}

#[test]
fn duplicate_names_are_kept_in_order() {
    let outcome = run(r#"
        pm.test("same", () => {});
        pm.test("same", () => pm.expect(1).to.equal(2));
        pm.test("other", () => {});
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![("same", true), ("same", false), ("other", true)]
    );
}

#[test]
fn nested_tests_are_recorded_before_their_parent() {
    let outcome = run(r#"
        pm.test("outer", () => {
            pm.test("inner", () => {});
        });
    "#);
    assert_eq!(verdicts(&outcome), vec![("inner", true), ("outer", true)]);
}

#[test]
fn non_function_body_fails_the_test() {
    let outcome = run(r#"pm.test("bad", 42); pm.test("good", () => {});"#);
    assert_eq!(verdicts(&outcome), vec![("bad", false), ("good", true)]);
    assert_eq!(error_of(&outcome, "bad"), "42 is not a function");
}

#[test]
fn function_declarations_work_as_test_bodies() {
    let outcome = run(r#"
        function checkStatus() { pm.response.to.have.status(200); }
        pm.test("declared", checkStatus);
    "#);
    assert_eq!(verdicts(&outcome), vec![("declared", true)]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Global script failures
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn syntax_error_reports_one_result_and_keeps_variables() {
    let input = vars(&[("token", "abc")]);
    let outcome = run_tests(
        "pm.environment.set('token', 'changed');\npm.test('x', () => {",
        &exchange(),
        input.clone(),
    );
    assert_eq!(outcome.test_results.len(), 1);
    let result = &outcome.test_results[0];
    assert_eq!(result.name, SCRIPT_RESULT_NAME);
    assert!(!result.passed);
    assert!(!result.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(outcome.updated_variables, input);
}

#[test]
fn top_level_error_is_appended_after_earlier_results() {
    let outcome = run(r#"
        pm.environment.set("before", "1");
        pm.test("first", () => {});
        notDefined();
        pm.test("never", () => {});
    "#);
    assert_eq!(
        outcome.test_results,
        vec![
            TestResult::pass("first"),
            TestResult::fail(
                SCRIPT_RESULT_NAME,
                "Global script error: notDefined is not defined"
            ),
        ]
    );
    assert_eq!(outcome.updated_variables.get("before"), Some("1"));
}

#[test]
fn uncaught_throw_uses_the_error_message() {
    let outcome = run(r#"throw new TypeError("bad input");"#);
    assert_eq!(
        outcome.test_results[0].error.as_deref(),
        Some("Global script error: bad input")
    );
}

#[test]
fn step_budget_cannot_be_caught() {
    let sandbox = Sandbox::new(RunnerConfig {
        step_budget: 10_000,
        ..RunnerConfig::default()
    });
    let outcome = sandbox.run(
        r#"
        pm.test("before", () => {});
        pm.test("spin", () => { try { while (true) {} } catch (e) {} });
        "#,
        &exchange(),
        VariableStore::new(),
    );
    assert_eq!(
        outcome.test_results,
        vec![
            TestResult::pass("before"),
            TestResult::fail(
                SCRIPT_RESULT_NAME,
                "Global script error: script exceeded step budget of 10000"
            ),
        ]
    );
}

#[test]
fn runaway_recursion_is_a_catchable_range_error() {
    let outcome = run(r#"
        function down(n) { return down(n + 1); }
        pm.test("deep", () => down(0));
        let caught = "";
        try { down(0); } catch (e) { caught = e.name; }
        pm.test("caught " + caught, () => {});
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![("deep", false), ("caught RangeError", true)]
    );
    assert_eq!(error_of(&outcome, "deep"), "Maximum call stack size exceeded");
}

#[test]
fn recursion_within_the_limit_succeeds() {
    let outcome = run(r#"
        function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }
        pm.test("fact", () => pm.expect(fact(10)).to.equal(3628800));
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

/// Run `body` inside a single test and return its failure message.
fn guard_error(body: &str) -> String {
    let outcome = run(&format!("pm.test('guard', () => {{ {body} }});"));
    error_of(&outcome, "guard").to_string()
}

#[test]
fn strings_past_sixteen_mib_are_range_errors() {
    let cases = [
        "const s = 'x'.repeat(16777216); s + 'y';",
        "const s = 'x'.repeat(16777216); `${s}y`;",
        "'ab'.repeat(8388609);",
        "'a'.padStart(16777217);",
        "'a'.padEnd(16777217, '-');",
        "const s = 'x'.repeat(8388608); [s, s, 'y'].join('');",
        "const s = 'x'.repeat(8388608); s.concat(s, 'y');",
        "'x'.repeat(1024).replaceAll('x', 'y'.repeat(16385));",
        "let t = 'x'; for (let i = 0; i < 40; i++) { t = [t, t].join(''); }",
        "let t = 'x'; for (let i = 0; i < 40; i++) { t = t.concat(t); }",
    ];
    for body in cases {
        assert_eq!(guard_error(body), "Invalid string length", "{body}");
    }
}

#[test]
fn strings_at_the_cap_are_allowed() {
    let outcome = run(r#"
        const half = 'x'.repeat(8388608);
        pm.test("join", () => pm.expect([half, half].join('').length).to.equal(16777216));
        pm.test("concat", () => pm.expect(half.concat(half).length).to.equal(16777216));
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

#[test]
fn arrays_past_the_cap_are_range_errors() {
    let cases = [
        "new Array(16777217);",
        "const a = []; a.length = 16777217;",
        "const a = []; a[16777216] = 1;",
    ];
    for body in cases {
        assert_eq!(guard_error(body), "Invalid array length", "{body}");
    }
}

#[test]
fn size_errors_are_catchable() {
    let outcome = run(r#"
        let name = "";
        try { 'x'.repeat(16777216).concat('y'); } catch (e) { name = e.name; }
        pm.test("caught " + name, () => {});
    "#);
    assert_eq!(verdicts(&outcome), vec![("caught RangeError", true)]);
}

#[test]
fn growing_an_array_is_charged_per_element() {
    let sandbox = Sandbox::new(RunnerConfig {
        step_budget: 10_000,
        ..RunnerConfig::default()
    });
    for script in ["const a = []; a.length = 50000;", "const a = []; a[50000] = 1;"] {
        let outcome = sandbox.run(script, &exchange(), VariableStore::new());
        assert_eq!(
            error_of(&outcome, SCRIPT_RESULT_NAME),
            "Global script error: script exceeded step budget of 10000",
            "{script}"
        );
    }
}

#[test]
fn string_lengths_count_utf16_code_units() {
    let outcome = run(r#"
        const s = 'a😀';
        pm.test("length", () => pm.expect(s.length).to.equal(3));
        pm.test("index", () => pm.expect(s.indexOf('😀')).to.equal(1));
        pm.test("code unit", () => pm.expect(s.charCodeAt(1)).to.equal(55357));
        pm.test("slice", () => pm.expect(s.slice(1)).to.equal('😀'));
        pm.test("keys", () => pm.expect(Object.keys(s).length).to.equal(3));
        const seen = [];
        for (const c of s) { seen.push(c); }
        pm.test("iteration", () => pm.expect(seen).to.eql(['a', '😀']));
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

// ══════════════════════════════════════════════════════════════════════════════
// Response facade
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn status_assertion_names_both_codes() {
    let script = "pm.test('status', () => pm.response.to.have.status(200));";
    let ok = run_tests(script, &exchange(), VariableStore::new());
    assert!(ok.all_passed());

    let not_found = Exchange::text(404, "Not Found", "missing");
    let failed = run_tests(script, &not_found, VariableStore::new());
    let error = error_of(&failed, "status");
    assert!(error.contains("200") && error.contains("404"), "{error}");
}

#[test]
fn response_fields() {
    let outcome = run(r#"
        pm.test("code", () => pm.expect(pm.response.code).to.equal(200));
        pm.test("status text", () => pm.expect(pm.response.status).to.equal("OK"));
        pm.test("nested json", () => {
            const body = pm.response.json();
            pm.expect(body.user.id).to.equal(7);
            pm.expect(body.user.tags).to.eql(["a", "b"]);
        });
        pm.test("json identity", () => pm.expect(pm.response.json()).to.equal(pm.response.json()));
        pm.test("text", () => pm.expect(JSON.parse(pm.response.text()).count).to.equal(3));
    "#);
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

#[test]
fn json_on_a_text_body_fails() {
    let exchange = Exchange::text(200, "OK", "plain body");
    let outcome = run_tests(
        r#"
        pm.test("json", () => pm.response.json());
        pm.test("text", () => pm.expect(pm.response.text()).to.equal("plain body"));
        "#,
        &exchange,
        VariableStore::new(),
    );
    assert_eq!(verdicts(&outcome), vec![("json", false), ("text", true)]);
    assert_eq!(error_of(&outcome, "json"), "response body is not JSON");
}

#[test]
fn from_raw_parses_json_by_content_type() {
    let headers = [("Content-Type".to_string(), "application/json; charset=utf-8".to_string())]
        .into_iter()
        .collect();
    let exchange = Exchange::from_raw(201, "Created", headers, r#"{"id": 9}"#);
    let outcome = run_tests(
        "pm.test('id', () => pm.expect(pm.response.json().id).to.equal(9));",
        &exchange,
        VariableStore::new(),
    );
    assert!(outcome.all_passed(), "{}", outcome.summary());
}

#[test]
fn header_lookup_and_assertion() {
    let outcome = run(r#"
        pm.test("get", () => pm.expect(pm.response.headers.get("X-Request-Id")).to.equal("abc-123"));
        pm.test("missing", () => pm.expect(pm.response.headers.get("X-Nope")).to.be.null);
        pm.test("has", () => pm.expect(pm.response.headers.has("Content-Type")).to.be.ok());
        pm.test("present", () => pm.response.to.have.header("Content-Type"));
        pm.test("value", () => pm.response.to.have.header("Content-Type", "application/json"));
        pm.test("absent", () => pm.response.to.have.header("X-Nope"));
        pm.test("wrong value", () => pm.response.to.have.header("X-Request-Id", "other"));
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![
            ("get", true),
            ("missing", true),
            ("has", true),
            ("present", true),
            ("value", true),
            ("absent", false),
            ("wrong value", false),
        ]
    );
    assert_eq!(
        error_of(&outcome, "absent"),
        "expected header 'X-Nope' to exist"
    );
    assert_eq!(
        error_of(&outcome, "wrong value"),
        "expected header 'X-Request-Id' to be 'other' but got 'abc-123'"
    );
}

#[test]
fn pm_objects_are_read_only() {
    let outcome = run(r#"
        pm.test("assign", () => { pm.response.code = 500; });
        pm.test("unchanged", () => pm.expect(pm.response.code).to.equal(200));
    "#);
    assert_eq!(verdicts(&outcome), vec![("assign", false), ("unchanged", true)]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Environment variables
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn variables_round_trip_between_runs() {
    let first = run_tests(
        "pm.environment.set('token', 'abc');",
        &exchange(),
        VariableStore::new(),
    );
    assert!(first.test_results.is_empty());

    let second = run_tests(
        "pm.test('token', () => pm.expect(pm.environment.get('token')).to.equal('abc'));",
        &exchange(),
        first.updated_variables,
    );
    assert!(second.all_passed(), "{}", second.summary());
}

#[test]
fn set_stores_string_values_on_a_copy() {
    let input = vars(&[("keep", "1")]);
    let outcome = run_tests(
        r#"
        pm.environment.set("n", 5);
        pm.environment.set("flag", true);
        pm.environment.set("obj", { a: 1 });
        pm.test("missing", () => pm.expect(pm.environment.get("nope")).to.be.an("undefined"));
        pm.test("has", () => pm.expect(pm.environment.has("keep")).to.be.ok());
        "#,
        &exchange(),
        input.clone(),
    );
    assert!(outcome.all_passed(), "{}", outcome.summary());
    assert_eq!(input.len(), 1);
    let updated = &outcome.updated_variables;
    assert_eq!(updated.get("n"), Some("5"));
    assert_eq!(updated.get("flag"), Some("true"));
    assert_eq!(updated.get("obj"), Some("[object Object]"));
    assert_eq!(updated.get("keep"), Some("1"));
}

#[test]
fn extracted_values_feed_the_next_request() {
    let outcome = run(r#"
        const body = pm.response.json();
        pm.environment.set("userId", body.user.id);
    "#);
    assert_eq!(
        replace_variables("/users/{{userId}}/{{unknown}}", &outcome.updated_variables),
        "/users/7/{{unknown}}"
    );
}

#[test]
fn environment_merge_after_a_run() {
    let mut env: Environment = serde_json::from_value(json!({
        "id": "env-1",
        "name": "Dev",
        "values": [
            { "key": "token", "value": "old", "enabled": true },
            { "key": "secret", "value": "hidden", "enabled": false }
        ]
    }))
    .unwrap();
    let outcome = run_tests(
        r#"
        pm.test("disabled is invisible", () => pm.expect(pm.environment.has("secret")).to.not.be.ok());
        pm.environment.set("token", "new");
        pm.environment.set("session", "s-1");
        "#,
        &exchange(),
        env.active_variables(),
    );
    assert!(outcome.all_passed(), "{}", outcome.summary());
    env.merge(&outcome.updated_variables);
    let pairs: Vec<(&str, &str, bool)> = env
        .values
        .iter()
        .map(|v| (v.key.as_str(), v.value.as_str(), v.enabled))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("token", "new", true),
            ("secret", "hidden", false),
            ("session", "s-1", true),
        ]
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Scripts, console and reports
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn collection_event_script_runs() {
    let events: Vec<ScriptEvent> = serde_json::from_value(json!([
        { "listen": "test", "script": { "exec": [
            "const data = pm.response.json();",
            "pm.test(\"success\", function () {",
            "    pm.expect(data.success).to.eql(\"OK\");",
            "});"
        ] } }
    ]))
    .unwrap();
    let outcome = run(&test_script(&events));
    assert_eq!(verdicts(&outcome), vec![("success", true)]);
}

#[test]
fn typical_test_script() {
    let outcome = run(r#"
        const data = pm.response.json();
        const ids = [3, 1, 2].sort((a, b) => a - b).map(n => `id-${n}`);
        pm.test("Response has users", function () {
            pm.expect(data).to.have.property("user");
            pm.expect(data.user.tags.length).to.be.above(1);
            pm.expect(data.user.tags.includes("b")).to.be.ok();
        });
        pm.test(`Sorted ${ids.join(",")}`, () => {
            pm.expect(ids).to.eql(["id-1", "id-2", "id-3"]);
        });
    "#);
    assert_eq!(
        verdicts(&outcome),
        vec![("Response has users", true), ("Sorted id-1,id-2,id-3", true)]
    );
}

#[test]
fn console_output_is_captured() {
    let outcome = run(r#"
        console.log("count", pm.response.json().count);
        console.warn({ a: 1 });
    "#);
    let logs: Vec<(LogLevel, &str)> = outcome
        .logs
        .iter()
        .map(|l| (l.level, l.message.as_str()))
        .collect();
    assert_eq!(
        logs,
        vec![(LogLevel::Log, "count 3"), (LogLevel::Warn, r#"{"a":1}"#)]
    );

    let quiet = Sandbox::new(RunnerConfig {
        capture_console: false,
        ..RunnerConfig::default()
    })
    .run("console.log('x');", &exchange(), VariableStore::new());
    assert!(quiet.logs.is_empty());
}

#[test]
fn outcome_serializes_for_the_host() {
    let outcome = run_tests(
        r#"pm.environment.set("k", "v"); pm.test("a", () => {}); pm.test("b", () => { throw new Error("x"); });"#,
        &exchange(),
        VariableStore::new(),
    );
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({
            "testResults": [
                { "name": "a", "passed": true },
                { "name": "b", "passed": false, "error": "x" }
            ],
            "updatedVariables": { "k": "v" }
        })
    );
}

#[test]
fn summary_report() {
    let outcome = run(r#"
        pm.test("passes", () => {});
        pm.test("fails", () => pm.expect(1).to.equal(2));
    "#);
    let summary = outcome.summary();
    assert_eq!((summary.passed, summary.failed, summary.total), (1, 1, 2));
    assert_eq!(
        summary.to_string(),
        "  ✓ passes\n  ✗ fails: expected 1 to equal 2\n\n1 passed, 1 failed\n"
    );
}

#[test]
fn independent_runs_on_separate_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let script = format!("pm.environment.set('run', '{i}');");
                run_tests(&script, &exchange(), VariableStore::new())
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.join().unwrap();
        assert_eq!(outcome.updated_variables.get("run"), Some(i.to_string().as_str()));
    }
}
