/// Correctness assessment of harness and suite results.
///
/// Pure functions: no I/O and no logging.
use crate::core::types::{ExecutionResult, IoExample};
use crate::harness::codec::Value;

/// Relative and absolute tolerance for top-level float comparison.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correctness {
    pub correctness: f64,
    pub passed: usize,
    pub total: usize,
}

impl Correctness {
    pub fn is_perfect(&self) -> bool {
        self.correctness == 1.0
    }
}

/// Compare an expected value with an actual one.
///
/// Two floats compare within [`FLOAT_TOLERANCE`] (relative and absolute);
/// every other pair, including int against float and floats nested in
/// containers, compares structurally and exactly. NaN equals NaN.
pub fn outputs_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Float(a), Value::Float(b)) => floats_close(*a, *b),
        _ => structurally_equal(expected, actual),
    }
}

fn floats_close(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    let diff = (a - b).abs();
    diff <= (FLOAT_TOLERANCE * a.abs().max(b.abs())).max(FLOAT_TOLERANCE)
}

fn structurally_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::BigInt(a), Value::BigInt(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structurally_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| structurally_equal(x, y)))
        }
        _ => false,
    }
}

/// Example mode: case `i` passes only when a successful record with
/// `test_case_id == i` carries the expected output. A missing result counts
/// every case as failed.
pub fn assess_examples(expected: &[IoExample], result: Option<&ExecutionResult>) -> Correctness {
    let total = expected.len();
    if total == 0 {
        return Correctness {
            correctness: 1.0,
            passed: 0,
            total: 0,
        };
    }

    let passed = match result {
        Some(result) => expected
            .iter()
            .enumerate()
            .filter(|(i, example)| {
                result
                    .record(*i)
                    .is_some_and(|record| record.is_success() && outputs_match(&example.output, &record.output))
            })
            .count(),
        None => 0,
    };

    Correctness {
        correctness: passed as f64 / total as f64,
        passed,
        total,
    }
}

/// Suite mode: `passed / (passed + failed)`, zero when nothing ran.
pub fn assess_suite(passed: u32, failed: u32) -> Correctness {
    let total = passed as usize + failed as usize;
    let correctness = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    };
    Correctness {
        correctness,
        passed: passed as usize,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CaseRecord, CaseStatus};

    fn success(id: usize, output: Value) -> CaseRecord {
        CaseRecord {
            test_case_id: id,
            output,
            error: None,
            error_type: None,
            runtime_ms: 0.1,
            status: CaseStatus::Success,
        }
    }

    fn failure(id: usize) -> CaseRecord {
        CaseRecord {
            test_case_id: id,
            output: Value::Null,
            error: Some("boom".to_string()),
            error_type: Some("ValueError".to_string()),
            runtime_ms: 0.1,
            status: CaseStatus::Error,
        }
    }

    fn examples(outputs: &[Value]) -> Vec<IoExample> {
        outputs
            .iter()
            .map(|output| IoExample::new(Value::Null, output.clone()))
            .collect()
    }

    #[test]
    fn float_tolerance() {
        assert!(outputs_match(&Value::Float(1.0000000001), &Value::Float(1.0)));
        assert!(!outputs_match(&Value::Float(1.01), &Value::Float(1.0)));
        assert!(outputs_match(&Value::Float(0.0), &Value::Float(1e-10)));
        assert!(outputs_match(&Value::Float(f64::INFINITY), &Value::Float(f64::INFINITY)));
        assert!(!outputs_match(&Value::Float(f64::INFINITY), &Value::Float(f64::NEG_INFINITY)));
        assert!(outputs_match(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(!outputs_match(&Value::Float(f64::NAN), &Value::Float(1.0)));
    }

    #[test]
    fn int_versus_float_is_exact_structural() {
        assert!(!outputs_match(&Value::Int(1), &Value::Float(1.0)));
        assert!(!outputs_match(&Value::Float(3.0), &Value::Int(3)));
        assert!(outputs_match(&Value::Int(3), &Value::Int(3)));
    }

    #[test]
    fn big_integers_compare_digit_for_digit() {
        let expected = Value::BigInt("1180591620717411303424".to_string());
        assert!(outputs_match(&expected, &Value::BigInt("1180591620717411303424".to_string())));
        assert!(!outputs_match(&expected, &Value::BigInt("1180591620717411303425".to_string())));
        assert!(!outputs_match(&expected, &Value::Float(1.1805916207174113e21)));
    }

    #[test]
    fn containers_compare_exactly() {
        let a = Value::List(vec![Value::Int(1), Value::Str("x".to_string())]);
        let b = Value::List(vec![Value::Int(1), Value::Str("x".to_string())]);
        assert!(outputs_match(&a, &b));
        assert!(!outputs_match(
            &Value::List(vec![Value::Float(1.0000000001)]),
            &Value::List(vec![Value::Float(1.0)])
        ));
        assert!(!outputs_match(&Value::List(vec![Value::Int(1)]), &Value::List(vec![])));
        assert!(!outputs_match(&Value::Bool(true), &Value::Int(1)));
    }

    #[test]
    fn all_cases_pass() {
        let expected = examples(&[Value::Int(3), Value::Int(3)]);
        let result = ExecutionResult {
            test_outputs: vec![success(0, Value::Int(3)), success(1, Value::Int(3))],
            average_runtime_ms: 0.1,
        };
        let verdict = assess_examples(&expected, Some(&result));
        assert_eq!(verdict, Correctness { correctness: 1.0, passed: 2, total: 2 });
        assert!(verdict.is_perfect());
    }

    #[test]
    fn wrong_outputs_score_zero() {
        let expected = examples(&[Value::Int(3), Value::Int(3)]);
        let result = ExecutionResult {
            test_outputs: vec![success(0, Value::Int(0)), success(1, Value::Int(0))],
            average_runtime_ms: 0.1,
        };
        let verdict = assess_examples(&expected, Some(&result));
        assert_eq!(verdict.passed, 0);
        assert_eq!(verdict.correctness, 0.0);
    }

    #[test]
    fn errors_and_missing_records_do_not_pass() {
        let expected = examples(&[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let result = ExecutionResult {
            test_outputs: vec![success(0, Value::Int(1)), failure(1), success(3, Value::Int(4))],
            average_runtime_ms: 0.1,
        };
        let verdict = assess_examples(&expected, Some(&result));
        assert_eq!(verdict.passed, 2);
        assert_eq!(verdict.total, 4);
        assert_eq!(verdict.correctness, 0.5);
    }

    #[test]
    fn records_match_by_id_not_position() {
        let expected = examples(&[Value::Int(10), Value::Int(20)]);
        let result = ExecutionResult {
            test_outputs: vec![success(1, Value::Int(20)), success(0, Value::Int(10))],
            average_runtime_ms: 0.1,
        };
        assert_eq!(assess_examples(&expected, Some(&result)).passed, 2);
    }

    #[test]
    fn passed_never_exceeds_total() {
        let expected = examples(&[Value::Int(1)]);
        let result = ExecutionResult {
            test_outputs: vec![success(0, Value::Int(1)), success(0, Value::Int(1)), success(5, Value::Int(1))],
            average_runtime_ms: 0.1,
        };
        let verdict = assess_examples(&expected, Some(&result));
        assert!(verdict.passed <= verdict.total);
        assert_eq!(verdict.correctness, verdict.passed as f64 / verdict.total as f64);
    }

    #[test]
    fn no_result_and_no_cases() {
        let expected = examples(&[Value::Int(1), Value::Int(2)]);
        assert_eq!(assess_examples(&expected, None).correctness, 0.0);
        assert_eq!(assess_examples(&[], None).correctness, 1.0);
    }

    #[test]
    fn suite_ratio() {
        assert_eq!(assess_suite(1, 1).correctness, 0.5);
        assert_eq!(assess_suite(3, 0).correctness, 1.0);
        assert_eq!(assess_suite(0, 0).correctness, 0.0);
        assert_eq!(assess_suite(0, 0).total, 0);
    }
}
