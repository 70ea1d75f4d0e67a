use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::{Comparator, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Comparator(Comparator),
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Comparator(c) => write!(f, "{}", c),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
        }
    }
}

/// A token with the byte offset it started at
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

impl Spanned {
    pub fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken {
            token: self.token.to_string(),
            position: self.position,
        }
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^\s*(?:(?P<and>&&)|(?P<or>\|\|)|(?P<cmp>==|!=|>=|<=|>|<)|"(?P<str>(?:[^"\\]|\\.)*)"|(?P<num>-?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_-]*))"#,
        )
        .expect("token pattern is valid")
    })
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let re = token_regex();
    let mut tokens = Vec::new();
    let mut offset = 0;

    while !source[offset..].trim().is_empty() {
        let caps = re
            .captures(&source[offset..])
            .ok_or_else(|| ParseError::InvalidInput(offset + leading_space(&source[offset..])))?;

        let whole = caps.get(0).map_or(0, |m| m.end());
        let position = offset + leading_space(&source[offset..]);

        let token = if caps.name("and").is_some() {
            Token::And
        } else if caps.name("or").is_some() {
            Token::Or
        } else if let Some(m) = caps.name("cmp") {
            Token::Comparator(comparator(m.as_str()))
        } else if let Some(m) = caps.name("str") {
            Token::Str(unescape(m.as_str()))
        } else if let Some(m) = caps.name("num") {
            let n = m
                .as_str()
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidNumber(m.as_str().to_string()))?;
            Token::Number(n)
        } else if let Some(m) = caps.name("ident") {
            Token::Ident(m.as_str().to_string())
        } else {
            return Err(ParseError::InvalidInput(position));
        };

        tokens.push(Spanned { token, position });
        offset += whole;
    }

    Ok(tokens)
}

fn leading_space(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn comparator(symbol: &str) -> Comparator {
    match symbol {
        "==" => Comparator::Eq,
        "!=" => Comparator::Ne,
        ">=" => Comparator::Ge,
        "<=" => Comparator::Le,
        ">" => Comparator::Gt,
        _ => Comparator::Lt,
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
