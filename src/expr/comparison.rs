//! Test-level grammar: `<variable> <comparator> <literal>` terms evaluated
//! against values extracted from an HTTP response.

use std::collections::HashMap;
use std::fmt;
use std::vec::IntoIter;

use super::lexer::{Spanned, Token};
use super::{parse_expression, EvalError, Evaluate, Evaluation, Expression, ParseError};

/// A value taken from a response.
///
/// Carries a string and a numeric form. Either may be missing: the status code
/// only has a number, a JSON string that doesn't parse as a number only has
/// text, and a path that resolved to nothing has neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Value {
    text: Option<String>,
    number: Option<f64>,
}

impl Value {
    /// Numeric-only value
    pub fn from_number(number: f64) -> Self {
        Self {
            text: None,
            number: Some(number),
        }
    }

    /// Text value, also parsed as a number when it looks like one
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let number = text.trim().parse::<f64>().ok();
        Self {
            text: Some(text),
            number,
        }
    }

    /// Value taken from a JSON document
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::String(s) => Self::from_text(s.as_str()),
            serde_json::Value::Number(n) => Self {
                text: Some(n.to_string()),
                number: n.as_f64(),
            },
            serde_json::Value::Bool(b) => Self {
                text: Some(b.to_string()),
                number: None,
            },
            serde_json::Value::Null => Self::default(),
            other => Self {
                text: Some(other.to_string()),
                number: None,
            },
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn number(&self) -> Option<f64> {
        self.number
    }
}

/// Values available to a test's expression, keyed by extraction name
pub type Values = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    /// Whether the comparator is legal against a string literal
    pub fn allows_text(self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Ne)
    }

    pub fn compare(self, actual: f64, expected: f64) -> bool {
        match self {
            Comparator::Eq => actual == expected,
            Comparator::Ne => actual != expected,
            Comparator::Gt => actual > expected,
            Comparator::Ge => actual >= expected,
            Comparator::Lt => actual < expected,
            Comparator::Le => actual <= expected,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub variable: String,
    pub comparator: Comparator,
    pub literal: Literal,
}

impl Comparison {
    pub fn is_string(&self) -> bool {
        matches!(self.literal, Literal::Text(_))
    }
}

impl Evaluate for Comparison {
    type Context = Values;

    fn evaluate(&self, values: &Values) -> Evaluation {
        let Some(value) = values.get(&self.variable) else {
            return Evaluation::fail(EvalError::VariableNotFound(self.variable.clone()));
        };

        let (passed, detail) = match &self.literal {
            Literal::Text(expected) => {
                // No text form compares as the empty string
                let actual = value.text().unwrap_or_default();
                let passed = match self.comparator {
                    Comparator::Eq => actual == expected.as_str(),
                    Comparator::Ne => actual != expected.as_str(),
                    comparator => {
                        return Evaluation::fail(EvalError::BadComparator {
                            comparator,
                            kind: "string",
                        })
                    }
                };
                let detail = format!(
                    "{}({}) {} {}",
                    self.variable,
                    actual,
                    self.comparator,
                    expected
                );
                (passed, detail)
            }
            Literal::Number(expected) => {
                // No numeric form never satisfies a numeric comparison
                let passed = value
                    .number()
                    .map_or(false, |actual| self.comparator.compare(actual, *expected));
                let actual = value
                    .number()
                    .map_or_else(|| "none".to_string(), |n| n.to_string());
                let detail = format!(
                    "{}({}) {} {}",
                    self.variable, actual, self.comparator, expected
                );
                (passed, detail)
            }
        };

        if passed {
            Evaluation::pass()
        } else {
            Evaluation::fail(EvalError::ComparisonFailed(detail))
        }
    }
}

pub type ComparisonExpression = Expression<Comparison>;

/// Compile a test's `ok` expression, e.g. `status_code == 200 && state == "up"`.
pub fn parse_comparison_expression(source: &str) -> Result<ComparisonExpression, ParseError> {
    parse_expression(source, parse_comparison)
}

fn parse_comparison(tokens: &mut IntoIter<Spanned>) -> Result<Comparison, ParseError> {
    let variable = match tokens.next() {
        Some(Spanned {
            token: Token::Ident(name),
            ..
        }) => name,
        Some(other) => return Err(other.unexpected()),
        None => return Err(ParseError::UnexpectedEnd("a variable name")),
    };

    let comparator = match tokens.next() {
        Some(Spanned {
            token: Token::Comparator(c),
            ..
        }) => c,
        Some(other) => return Err(other.unexpected()),
        None => return Err(ParseError::UnexpectedEnd("a comparator")),
    };

    let literal = match tokens.next() {
        Some(Spanned {
            token: Token::Str(s),
            ..
        }) => {
            if !comparator.allows_text() {
                return Err(ParseError::BadComparator(comparator));
            }
            Literal::Text(s)
        }
        Some(Spanned {
            token: Token::Number(n),
            ..
        }) => Literal::Number(n),
        Some(other) => return Err(other.unexpected()),
        None => return Err(ParseError::UnexpectedEnd("a literal")),
    };

    Ok(Comparison {
        variable,
        comparator,
        literal,
    })
}
