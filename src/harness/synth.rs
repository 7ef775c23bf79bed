//! Harness synthesis for example-based grading.
//!
//! The generated script is self-contained: candidate source, target name and
//! example cases are embedded as JSON string literals (which are also valid
//! Python string literals), so nothing the candidate contains can break out of
//! its literal. Boolean and null spelling is normalized by `json.loads` on the
//! Python side instead of textual substitution.

use crate::config::types::{EvalError, Result};
use crate::core::types::{ExecutionResult, IoExample};
use serde::Deserialize;

/// Script name inside the scratch directory.
pub const HARNESS_FILE: &str = "harness.py";

/// Target callable could not be found.
pub const RESOLUTION_FAILURE_EXIT: i32 = 2;
/// `MemoryError` escaped the batch. Per-case `MemoryError`s only escalate
/// when a memory ceiling is set; otherwise they are recorded like any other
/// case error.
pub const MEMORY_EXHAUSTED_EXIT: i32 = 3;
/// Candidate raised while its module body executed.
pub const LOAD_FAILURE_EXIT: i32 = 4;

const HARNESS_PRELUDE: &str = r#"import contextlib
import json
import math
import os
import sys
import time

RESOLUTION_FAILURE_EXIT = 2
MEMORY_EXHAUSTED_EXIT = 3
LOAD_FAILURE_EXIT = 4

_STDOUT = sys.stdout
_SENTINELS = {"Infinity": float("inf"), "-Infinity": float("-inf"), "NaN": float("nan")}


def _decode(value):
    if isinstance(value, str):
        return _SENTINELS.get(value, value)
    if isinstance(value, list):
        return [_decode(item) for item in value]
    if isinstance(value, dict):
        return {key: _decode(item) for key, item in value.items()}
    return value


def _encode(value):
    if isinstance(value, float):
        if math.isnan(value):
            return "NaN"
        if math.isinf(value):
            return "Infinity" if value > 0 else "-Infinity"
        return value
    if isinstance(value, (list, tuple)):
        return [_encode(item) for item in value]
    if isinstance(value, dict):
        return {key: _encode(item) for key, item in value.items()}
    return value


def _describe(exc):
    try:
        return str(exc)
    except Exception:
        return "unprintable error"


def _emit(payload):
    _STDOUT.write(json.dumps(payload, allow_nan=False) + "\n")
    _STDOUT.flush()


def _fail(exit_code, message, error_type):
    _emit({"error": message, "error_type": error_type})
    sys.exit(exit_code)


def _load_candidate(source):
    namespace = {"__name__": "__candidate__"}
    code = compile(source, "candidate.py", "exec")
    with contextlib.redirect_stdout(sys.stderr):
        exec(code, namespace)
    return namespace


def _resolve_direct(namespace, name):
    value = namespace.get(name)
    if value is not None and callable(value):
        return value
    return None


def _resolve_in_types(namespace, name):
    for value in list(namespace.values()):
        if isinstance(value, type) and getattr(value, "__module__", None) == "__candidate__":
            member = getattr(value, name, None)
            if member is not None and callable(member):
                return member
    return None


def _invoke(function, args):
    if isinstance(args, list):
        return function(*args)
    if isinstance(args, dict):
        return function(**args)
    if args is None:
        return function()
    return function(args)


def _error_record(index, message, exc, elapsed):
    return {
        "test_case_id": index,
        "error": message,
        "error_type": type(exc).__name__,
        "runtime_ms": elapsed,
        "status": "error",
    }


def _escalates(exc):
    return isinstance(exc, MemoryError) and _MEMORY_CEILING


def _run_case(function, index, case):
    args = case.get("input") if isinstance(case, dict) else None
    started = time.perf_counter()
    try:
        with contextlib.redirect_stdout(sys.stderr):
            output = _invoke(function, args)
    except (Exception, SystemExit) as exc:
        if _escalates(exc):
            raise
        elapsed = (time.perf_counter() - started) * 1000.0
        return _error_record(index, _describe(exc), exc, elapsed)
    elapsed = (time.perf_counter() - started) * 1000.0
    try:
        encoded = _encode(output)
        json.dumps(encoded, allow_nan=False)
    except Exception as exc:
        if _escalates(exc):
            raise
        message = "unserializable output of type %s: %s" % (type(output).__name__, _describe(exc))
        return _error_record(index, message, exc, elapsed)
    return {"test_case_id": index, "output": encoded, "runtime_ms": elapsed, "status": "success"}

"#;

const HARNESS_MAIN: &str = r#"

def main():
    try:
        namespace = _load_candidate(_CANDIDATE_SOURCE)
    except BaseException as exc:
        if _escalates(exc):
            raise
        _fail(
            LOAD_FAILURE_EXIT,
            "candidate failed to load: %s: %s" % (type(exc).__name__, _describe(exc)),
            type(exc).__name__,
        )

    function = _resolve_direct(namespace, _FUNCTION_NAME)
    if function is None:
        function = _resolve_in_types(namespace, _FUNCTION_NAME)
    if function is None:
        _fail(
            RESOLUTION_FAILURE_EXIT,
            "Function '%s' not found in the global scope or as a callable method of a defined class."
            % _FUNCTION_NAME,
            "ResolutionError",
        )

    cases = _decode(json.loads(_CASES_JSON))
    records = []
    total_ms = 0.0
    succeeded = 0
    for index, case in enumerate(cases):
        record = _run_case(function, index, case)
        if record["status"] == "success":
            total_ms += record["runtime_ms"]
            succeeded += 1
        records.append(record)

    average = total_ms / succeeded if succeeded else 0.0
    _emit({"test_outputs": records, "average_runtime_ms": average})


if __name__ == "__main__":
    try:
        main()
    except MemoryError:
        if _MEMORY_CEILING:
            sys.stderr.write("MemoryError: candidate exhausted its memory limit\n")
        else:
            sys.stderr.write("MemoryError: interpreter ran out of memory outside a test case\n")
        sys.stderr.flush()
        os._exit(MEMORY_EXHAUSTED_EXIT)
"#;

/// Structured failure printed by the harness before a non-zero exit.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessFailure {
    pub error: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Render `text` as a literal valid in both JSON and Python source.
fn python_str_literal(text: &str) -> Result<String> {
    serde_json::to_string(text)
        .map_err(|e| EvalError::Codec(format!("failed to embed string literal: {}", e)))
}

/// Build the harness script for one batch of examples.
///
/// `memory_ceiling` tells the script whether an address-space limit is in
/// force, which decides if a `MemoryError` fails one case or the batch.
pub fn build_harness(
    candidate_code: &str,
    function_name: &str,
    examples: &[IoExample],
    memory_ceiling: bool,
) -> Result<String> {
    let cases_json = serde_json::to_string(examples)
        .map_err(|e| EvalError::Codec(format!("failed to encode examples: {}", e)))?;

    let candidate_literal = python_str_literal(candidate_code)?;
    let name_literal = python_str_literal(function_name)?;
    let cases_literal = python_str_literal(&cases_json)?;

    let mut script = String::with_capacity(
        HARNESS_PRELUDE.len() + HARNESS_MAIN.len() + candidate_literal.len() + cases_literal.len() + 128,
    );
    script.push_str(HARNESS_PRELUDE);
    script.push_str(&format!("_CANDIDATE_SOURCE = {}\n", candidate_literal));
    script.push_str(&format!("_FUNCTION_NAME = {}\n", name_literal));
    script.push_str(&format!("_CASES_JSON = {}\n", cases_literal));
    script.push_str(&format!(
        "_MEMORY_CEILING = {}\n",
        if memory_ceiling { "True" } else { "False" }
    ));
    script.push_str(HARNESS_MAIN);
    Ok(script)
}

/// Parse the harness's single stdout line.
pub fn decode_report(stdout: &str) -> Result<ExecutionResult> {
    let line = stdout.trim();
    if line.is_empty() {
        return Err(EvalError::Process("No output from script".to_string()));
    }
    serde_json::from_str::<ExecutionResult>(line).map_err(|e| {
        EvalError::Codec(format!(
            "Failed to decode JSON output: {}. Raw output: '{}'",
            e,
            abbreviate(line, 512)
        ))
    })
}

/// Parse the structured error a failing harness prints, if any.
pub fn decode_failure(stdout: &str) -> Option<HarnessFailure> {
    serde_json::from_str::<HarnessFailure>(stdout.trim()).ok()
}

pub(crate) fn abbreviate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::codec::Value;

    fn add_examples() -> Vec<IoExample> {
        vec![
            IoExample::new(Value::List(vec![Value::Int(1), Value::Int(2)]), Value::Int(3)),
            IoExample::new(Value::List(vec![Value::Int(5), Value::Int(-2)]), Value::Int(3)),
        ]
    }

    #[test]
    fn script_embeds_candidate_name_and_cases() {
        let script = build_harness("def add(a, b):\n    return a + b\n", "add", &add_examples(), false).unwrap();
        assert!(script.contains(r#"_CANDIDATE_SOURCE = "def add(a, b):\n    return a + b\n""#));
        assert!(script.contains(r#"_FUNCTION_NAME = "add""#));
        assert!(script.contains(r#"_CASES_JSON = "[{\"input\":[1,2],\"output\":3}"#));
        assert!(script.contains("def _resolve_direct"));
        assert!(script.contains("def _resolve_in_types"));
    }

    #[test]
    fn memory_ceiling_flag_is_embedded() {
        let unbounded = build_harness("def f():\n    pass\n", "f", &[], false).unwrap();
        assert!(unbounded.lines().any(|line| line == "_MEMORY_CEILING = False"));
        let bounded = build_harness("def f():\n    pass\n", "f", &[], true).unwrap();
        assert!(bounded.lines().any(|line| line == "_MEMORY_CEILING = True"));
        assert!(bounded.contains("if _escalates(exc):"));
    }

    #[test]
    fn big_integer_expectations_keep_their_digits() {
        let examples = vec![IoExample::new(
            Value::Int(70),
            Value::BigInt("1180591620717411303424".to_string()),
        )];
        let script = build_harness("def f(n):\n    return 2 ** n\n", "f", &examples, false).unwrap();
        assert!(script.contains(r#"\"output\":1180591620717411303424"#));
    }

    #[test]
    fn hostile_candidate_stays_inside_its_literal() {
        let code = "x = \"\"\"\n\"\"\"\nprint('\\n')\n_FUNCTION_NAME = 'evil'\n";
        let script = build_harness(code, "f", &[], false).unwrap();
        let line = script
            .lines()
            .find(|line| line.starts_with("_CANDIDATE_SOURCE = "))
            .unwrap();
        let literal = line.trim_start_matches("_CANDIDATE_SOURCE = ");
        let back: String = serde_json::from_str(literal).unwrap();
        assert_eq!(back, code);
        assert!(!script.lines().any(|line| line == "_FUNCTION_NAME = 'evil'"));
    }

    #[test]
    fn non_finite_expectations_use_sentinels() {
        let examples = vec![IoExample::new(Value::Float(f64::NEG_INFINITY), Value::Float(f64::NAN))];
        let script = build_harness("def f(x):\n    return x\n", "f", &examples, false).unwrap();
        assert!(script.contains(r#"\"input\":\"-Infinity\""#));
        assert!(script.contains(r#"\"output\":\"NaN\""#));
    }

    #[test]
    fn booleans_and_null_are_embedded_as_json() {
        let examples = vec![IoExample::new(Value::List(vec![Value::Bool(true), Value::Null]), Value::Bool(false))];
        let script = build_harness("def f(a, b):\n    return False\n", "f", &examples, false).unwrap();
        assert!(script.contains(r#"[true,null]"#));
        assert!(script.contains("json.loads(_CASES_JSON)"));
    }

    #[test]
    fn report_decodes_and_rejects_noise() {
        let report = decode_report(
            "{\"test_outputs\": [{\"test_case_id\": 0, \"output\": \"Infinity\", \"runtime_ms\": 0.5, \"status\": \"success\"}], \"average_runtime_ms\": 0.5}\n",
        )
        .unwrap();
        assert!(matches!(report.test_outputs[0].output, Value::Float(f) if f == f64::INFINITY));

        assert!(matches!(decode_report(""), Err(EvalError::Process(_))));
        assert!(matches!(decode_report("hello\n{}"), Err(EvalError::Codec(_))));
    }

    #[test]
    fn structured_failure_decodes() {
        let failure = decode_failure("{\"error\": \"Function 'add' not found\", \"error_type\": \"ResolutionError\"}\n").unwrap();
        assert_eq!(failure.error_type.as_deref(), Some("ResolutionError"));
        assert!(decode_failure("Traceback (most recent call last):").is_none());
    }

    #[test]
    fn abbreviate_limits_length() {
        assert_eq!(abbreviate("abcdef", 3), "abc...");
        assert_eq!(abbreviate("abc", 3), "abc");
    }
}
