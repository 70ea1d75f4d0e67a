//! Job-level grammar: bare test names combined with `&&` / `||`.

use std::collections::HashMap;
use std::vec::IntoIter;

use super::lexer::{Spanned, Token};
use super::{parse_expression, EvalError, Evaluate, Evaluation, Expression, ParseError};

/// Per-test results of one job cycle, `true` when the test was Ok
pub type TestResults = HashMap<String, bool>;

/// Reference to a test by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub test: String,
}

impl Evaluate for Reference {
    type Context = TestResults;

    fn evaluate(&self, results: &TestResults) -> Evaluation {
        match results.get(&self.test) {
            None => Evaluation::fail(EvalError::VariableNotFound(self.test.clone())),
            Some(true) => Evaluation::pass(),
            Some(false) => Evaluation::fail(EvalError::TestFailed(self.test.clone())),
        }
    }
}

pub type ReferenceExpression = Expression<Reference>;

impl ReferenceExpression {
    /// Names of all tests the expression mentions
    pub fn referenced_tests(&self) -> impl Iterator<Item = &str> {
        self.operands().map(|r| r.test.as_str())
    }
}

/// Compile a job's `ok` expression, e.g. `health && search || fallback`.
pub fn parse_reference_expression(source: &str) -> Result<ReferenceExpression, ParseError> {
    parse_expression(source, parse_reference)
}

fn parse_reference(tokens: &mut IntoIter<Spanned>) -> Result<Reference, ParseError> {
    match tokens.next() {
        Some(Spanned {
            token: Token::Ident(test),
            ..
        }) => Ok(Reference { test }),
        Some(other) => Err(other.unexpected()),
        None => Err(ParseError::UnexpectedEnd("a test name")),
    }
}
