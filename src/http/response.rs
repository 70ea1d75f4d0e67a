//! Turning responses into expression values
//!
//! `status_code` is always present. Other values are read from the JSON body
//! by dotted path (`data.items.0.count`), only when something is extracted.

use std::collections::BTreeMap;

use crate::expr::{Value, Values};

use super::RunError;

/// Name under which the HTTP status is always available
pub const STATUS_CODE: &str = "status_code";

/// Describes which values to pull out of a response
#[derive(Debug, Clone, Default)]
pub struct Response {
    extract: BTreeMap<String, String>,
}

impl Response {
    pub fn new(extract: BTreeMap<String, String>) -> Self {
        Self { extract }
    }

    /// Extract the value at `path` as `name`
    pub fn with_extract(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.extract.insert(name.into(), path.into());
        self
    }

    /// Read a response into values.
    ///
    /// The body is only read when something has to be extracted from it, in
    /// which case it must be valid JSON.
    pub async fn run(&self, response: reqwest::Response) -> Result<Values, RunError> {
        let status = response.status().as_u16();
        if self.extract.is_empty() {
            return self.extract_from(status, None);
        }
        let body = response.bytes().await?;
        self.extract_from(status, Some(body.as_ref()))
    }

    /// Build values from a status code and an optional body
    pub fn extract_from(&self, status: u16, body: Option<&[u8]>) -> Result<Values, RunError> {
        let mut values = Values::new();
        values.insert(STATUS_CODE.to_string(), Value::from_number(f64::from(status)));

        if self.extract.is_empty() {
            return Ok(values);
        }

        let json: serde_json::Value = serde_json::from_slice(body.unwrap_or_default())?;
        for (name, path) in &self.extract {
            let value = lookup(&json, path)
                .map(|v| Value::from_json(&v))
                .unwrap_or_default();
            values.insert(name.clone(), value);
        }

        Ok(values)
    }
}

/// Resolve a dotted path against a JSON document.
///
/// Segments are object keys, or indexes when the current node is an array.
/// `#` on an array yields its length.
pub fn lookup(json: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    if path.is_empty() {
        return None;
    }

    let mut node = json;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        node = match node {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) if segment == "#" => {
                return match segments.peek() {
                    None => Some(serde_json::Value::from(items.len())),
                    Some(_) => None,
                };
            }
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(node.clone())
}
