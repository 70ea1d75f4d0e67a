//! Outbound requests and their template context

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Serialize;

use super::{template, RunError};

/// Parse and validate an HTTP method name, case-insensitively.
pub fn parse_method(method: &str) -> Option<Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "HEAD" => Some(Method::HEAD),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "CONNECT" => Some(Method::CONNECT),
        "OPTIONS" => Some(Method::OPTIONS),
        "TRACE" => Some(Method::TRACE),
        _ => None,
    }
}

/// Template context for request bodies.
///
/// Seeded once per configuration generation from `UPWATCH_*` environment
/// variables (prefix stripped), then overlaid per alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Replacement(BTreeMap<String, String>);

impl Replacement {
    pub const ENV_PREFIX: &'static str = "UPWATCH_";

    /// Build from the process environment
    pub fn from_env() -> Self {
        // Non UTF-8 entries can't be template values anyway
        Self::from_vars(std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        }))
    }

    /// Build from `(name, value)` pairs, keeping only prefixed names
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self(
            vars.into_iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(Self::ENV_PREFIX)
                        .map(|stripped| (stripped.to_string(), v))
                })
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Replacement {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

/// A validated outbound request
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    query_params: BTreeMap<String, String>,
    body: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Set the body template
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the request. The body, if any, is rendered from `replacement`.
    ///
    /// `client` is shared by every job and alerter; `reqwest::Client` pools
    /// connections internally and is safe to use from many tasks at once.
    pub async fn run(
        &self,
        client: &reqwest::Client,
        replacement: &Replacement,
    ) -> Result<reqwest::Response, RunError> {
        let mut builder = client.request(self.method.clone(), &self.url);

        if !self.query_params.is_empty() {
            builder = builder.query(&self.query_params);
        }

        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &self.body {
            builder = builder.body(template::render(body, replacement)?);
        }

        Ok(builder.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get"), Some(Method::GET));
        assert_eq!(parse_method("Post"), Some(Method::POST));
        assert_eq!(parse_method("TRACE"), Some(Method::TRACE));
        assert_eq!(parse_method("FETCH"), None);
        assert_eq!(parse_method(""), None);
    }

    #[test]
    fn test_replacement_from_vars() {
        let vars = vec![
            ("UPWATCH_TOKEN".to_string(), "secret".to_string()),
            ("HOME".to_string(), "/root".to_string()),
            ("UPWATCH_".to_string(), "empty-name".to_string()),
        ];
        let repl = Replacement::from_vars(vars);
        assert_eq!(repl.get("TOKEN"), Some("secret"));
        assert_eq!(repl.get("HOME"), None);
        assert_eq!(repl.len(), 2);
    }

    #[test]
    fn test_replacement_overlay() {
        let mut repl = Replacement::default().with("job", "old");
        repl.extend([("job", "new"), ("team", "core")]);
        assert_eq!(repl.get("job"), Some("new"));
        assert_eq!(repl.get("team"), Some("core"));
    }

    #[tokio::test]
    async fn test_run_sends_templated_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_query(mockito::Matcher::UrlEncoded(
                "source".into(),
                "upwatch".into(),
            ))
            .match_header("x-team", "core")
            .match_body(r#"{"job":"api","state":"Ok"}"#)
            .with_status(200)
            .create_async()
            .await;

        let request = Request::new(Method::POST, format!("{}/hook", server.url()))
            .with_header("x-team", "core")
            .with_query_param("source", "upwatch")
            .with_body(r#"{"job":"{{ job }}","state":"{{ state }}"}"#);
        let repl = Replacement::default()
            .with("job", "api")
            .with("state", "Ok");

        let response = request.run(&reqwest::Client::new(), &repl).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_fails_on_unresolved_placeholder() {
        let request = Request::new(Method::POST, "http://127.0.0.1:9/")
            .with_body("{{ not_there }}");
        let result = request
            .run(&reqwest::Client::new(), &Replacement::default())
            .await;
        assert!(matches!(result, Err(RunError::Template(_))));
    }
}
