//! HTTP plumbing shared by tests and alerters
//!
//! A [`Request`] is sent with a shared `reqwest::Client`; its body is rendered
//! from a [`Replacement`] first. A [`Response`] turns what came back into the
//! [`Values`](crate::expr::Values) a test expression is evaluated against.

pub mod client;
pub mod request;
pub mod response;
pub mod template;

pub use client::build_client;
pub use request::{parse_method, Replacement, Request};
pub use response::{lookup, Response};

/// Errors raised while running a request or reading its response
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unable to parse JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
