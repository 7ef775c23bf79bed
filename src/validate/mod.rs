//! Static validation of candidate source
//!
//! Parse-only checks that run before any scratch directory or child process
//! is allocated.

pub mod symbols;

use crate::config::types::EvalError;
use rustpython_parser::{ast, Parse};

/// Source path reported in parser diagnostics.
pub const CANDIDATE_SOURCE_PATH: &str = "<candidate>";

/// A candidate that parsed cleanly.
#[derive(Debug)]
pub struct ParsedCandidate {
    pub suite: ast::Suite,
    /// Source uses constructs that bind names at runtime (`exec`,
    /// `globals()` writes, `global` declarations, assignment expressions),
    /// so absence of a symbol cannot be proven.
    pub dynamic_bindings: bool,
}

/// Parse candidate source without executing it.
///
/// The grammar is rustpython-parser's, not the interpreter's that later runs
/// the code. Syntax newer than the parser (PEP 701 f-strings, for one) is
/// reported as a syntax error even when CPython would accept it.
pub fn parse_candidate(code: &str) -> Result<ParsedCandidate, EvalError> {
    if code.contains('\0') {
        return Err(EvalError::Syntax(
            "source code cannot contain null bytes".to_string(),
        ));
    }

    let suite = ast::Suite::parse(code, CANDIDATE_SOURCE_PATH).map_err(|err| {
        let offset = u32::from(err.offset) as usize;
        let (line, column) = line_and_column(code, offset);
        EvalError::Syntax(format!("{} at line {}, offset {}", err.error, line, column))
    })?;

    Ok(ParsedCandidate {
        suite,
        dynamic_bindings: symbols::has_dynamic_bindings(code),
    })
}

/// Syntax diagnostics for `code`; empty when it parses.
///
/// Judged by the same grammar as [`parse_candidate`], which can lag the
/// newest CPython syntax.
pub fn validate(code: &str) -> Vec<String> {
    match parse_candidate(code) {
        Ok(_) => Vec::new(),
        Err(err) => vec![err.to_string()],
    }
}

/// 1-based line and column of a byte offset.
fn line_and_column(code: &str, offset: usize) -> (usize, usize) {
    let mut end = offset.min(code.len());
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    let before = &code[..end];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_has_no_diagnostics() {
        assert!(validate("def add(a, b):\n    return a + b\n").is_empty());
    }

    #[test]
    fn syntax_error_is_reported_with_location() {
        let diagnostics = validate("def add(a, b)\n    return a + b\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].starts_with("SyntaxError: "), "{}", diagnostics[0]);
        assert!(diagnostics[0].contains("at line 1"), "{}", diagnostics[0]);
    }

    #[test]
    fn error_on_later_line_reports_that_line() {
        let diagnostics = validate("x = 1\ny = (\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].contains("at line 1,"), "{}", diagnostics[0]);
    }

    #[test]
    fn null_bytes_are_rejected() {
        let diagnostics = validate("x = 1\0");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("null bytes"));
    }

    #[test]
    fn empty_source_parses() {
        assert!(validate("").is_empty());
    }

    #[test]
    fn line_and_column_counts_chars() {
        assert_eq!(line_and_column("ab\ncd", 4), (2, 2));
        assert_eq!(line_and_column("é=", 2), (1, 2));
        assert_eq!(line_and_column("x", 99), (1, 2));
    }
}
