//! Flat boolean expression language
//!
//! Both tests and jobs describe "healthy" with the same shape of expression:
//! `term (("&&" | "||") term)*`. The terms differ:
//!
//! - tests compare a response value against a literal (`status_code == 200`),
//!   see [`comparison`];
//! - jobs reference the outcome of one of their tests by name
//!   (`health && latency`), see [`reference`].
//!
//! Terms are folded left to right with no precedence and no short-circuiting.
//! Every term is evaluated, and the error reported for the whole expression is
//! the last one any term produced, even when a later term decided the result.

pub mod comparison;
mod lexer;
pub mod reference;

use std::vec::IntoIter;

pub use comparison::{
    parse_comparison_expression, Comparator, Comparison, ComparisonExpression, Literal, Value,
    Values,
};
pub use reference::{parse_reference_expression, Reference, ReferenceExpression, TestResults};

use lexer::{Spanned, Token};

/// Outcome of evaluating a term or a whole expression.
///
/// A failed evaluation usually carries an error describing why, which ends up
/// in logs and alert context. A passing expression may still carry the error
/// of one of its terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub passed: bool,
    pub error: Option<EvalError>,
}

impl Evaluation {
    pub fn pass() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    pub fn fail(error: EvalError) -> Self {
        Self {
            passed: false,
            error: Some(error),
        }
    }
}

/// Something that can be evaluated against a context to a boolean.
pub trait Evaluate {
    /// Lookup table the operand resolves names against
    type Context: ?Sized;

    fn evaluate(&self, context: &Self::Context) -> Evaluation;
}

/// How a term combines with the value accumulated so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Take the term's value (first term)
    None,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term<L> {
    pub operator: Operator,
    pub operand: L,
}

/// A compiled expression over operands of type `L`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression<L> {
    terms: Vec<Term<L>>,
}

impl<L> Expression<L> {
    pub fn new(terms: Vec<Term<L>>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[Term<L>] {
        &self.terms
    }

    /// Iterate over the operands in source order
    pub fn operands(&self) -> impl Iterator<Item = &L> {
        self.terms.iter().map(|t| &t.operand)
    }
}

impl<L: Evaluate> Evaluate for Expression<L> {
    type Context = L::Context;

    fn evaluate(&self, context: &Self::Context) -> Evaluation {
        let mut passed = false;
        let mut error = None;

        for (i, term) in self.terms.iter().enumerate() {
            let result = term.operand.evaluate(context);
            if result.error.is_some() {
                error = result.error;
            }

            // The first operator is ignored whatever it says
            passed = match (i, term.operator) {
                (0, _) | (_, Operator::None) => result.passed,
                (_, Operator::And) => passed && result.passed,
                (_, Operator::Or) => passed || result.passed,
            };
        }

        Evaluation { passed, error }
    }
}

/// Compile `source` into an expression, using `operand` to parse each term.
fn parse_expression<L>(
    source: &str,
    operand: impl Fn(&mut IntoIter<Spanned>) -> Result<L, ParseError>,
) -> Result<Expression<L>, ParseError> {
    let tokens = lexer::tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut tokens = tokens.into_iter();
    let mut terms = vec![Term {
        operator: Operator::None,
        operand: operand(&mut tokens)?,
    }];

    while let Some(spanned) = tokens.next() {
        let operator = match spanned.token {
            Token::And => Operator::And,
            Token::Or => Operator::Or,
            _ => return Err(spanned.unexpected()),
        };
        terms.push(Term {
            operator,
            operand: operand(&mut tokens)?,
        });
    }

    Ok(Expression::new(terms))
}

/// Expression compile errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Expression is empty")]
    Empty,

    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Unrecognised input at position {0}")]
    InvalidInput(usize),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Comparator '{0}' cannot be used with a string literal")]
    BadComparator(Comparator),
}

/// Expression evaluation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("'{0}' not found")]
    VariableNotFound(String),

    #[error("Bad comparator '{comparator}' for {kind} comparison")]
    BadComparator {
        comparator: Comparator,
        kind: &'static str,
    },

    #[error("Test Failed: {0}")]
    ComparisonFailed(String),

    #[error("Test '{0}' failed")]
    TestFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Operand with a fixed result that counts how often it was evaluated
    struct Fixed {
        passed: bool,
        label: &'static str,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(passed: bool, label: &'static str) -> Self {
            Self {
                passed,
                label,
                calls: Cell::new(0),
            }
        }
    }

    impl Evaluate for Fixed {
        type Context = ();

        fn evaluate(&self, _: &()) -> Evaluation {
            self.calls.set(self.calls.get() + 1);
            if self.passed {
                Evaluation::pass()
            } else {
                Evaluation::fail(EvalError::TestFailed(self.label.to_string()))
            }
        }
    }

    fn expr(terms: Vec<(Operator, Fixed)>) -> Expression<Fixed> {
        Expression::new(
            terms
                .into_iter()
                .map(|(operator, operand)| Term { operator, operand })
                .collect(),
        )
    }

    #[test]
    fn test_left_fold_without_precedence() {
        // (false || true) && false, not false || (true && false)
        let e = expr(vec![
            (Operator::None, Fixed::new(false, "a")),
            (Operator::Or, Fixed::new(true, "b")),
            (Operator::And, Fixed::new(false, "c")),
        ]);
        assert!(!e.evaluate(&()).passed);

        // (true || false) && true
        let e = expr(vec![
            (Operator::None, Fixed::new(true, "a")),
            (Operator::Or, Fixed::new(false, "b")),
            (Operator::And, Fixed::new(true, "c")),
        ]);
        assert!(e.evaluate(&()).passed);
    }

    #[test]
    fn test_no_short_circuit() {
        let e = expr(vec![
            (Operator::None, Fixed::new(false, "a")),
            (Operator::And, Fixed::new(true, "b")),
            (Operator::Or, Fixed::new(true, "c")),
        ]);
        e.evaluate(&());
        assert!(e.operands().all(|o| o.calls.get() == 1));
    }

    #[test]
    fn test_last_error_wins() {
        let e = expr(vec![
            (Operator::None, Fixed::new(false, "a")),
            (Operator::Or, Fixed::new(false, "b")),
            (Operator::Or, Fixed::new(true, "c")),
        ]);
        let result = e.evaluate(&());
        assert!(result.passed);
        assert_eq!(result.error, Some(EvalError::TestFailed("b".to_string())));
    }

    #[test]
    fn test_first_operator_ignored() {
        let e = expr(vec![
            (Operator::And, Fixed::new(true, "a")),
            (Operator::Or, Fixed::new(false, "b")),
        ]);
        let result = e.evaluate(&());
        assert!(result.passed);
        assert_eq!(result.error, Some(EvalError::TestFailed("b".to_string())));
    }
}
