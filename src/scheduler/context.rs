//! Execution context shared by every request

use std::sync::Arc;

use crate::http::Replacement;

/// What every request execution needs: the shared HTTP client and the base
/// template replacement of the current configuration generation.
///
/// Cloning is cheap; `reqwest::Client` is reference counted and safe to use
/// from any number of tasks.
#[derive(Debug, Clone)]
pub struct ExecContext {
    client: reqwest::Client,
    base: Arc<Replacement>,
}

impl ExecContext {
    pub fn new(client: reqwest::Client, base: Replacement) -> Self {
        Self {
            client,
            base: Arc::new(base),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base(&self) -> &Replacement {
        &self.base
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), Replacement::default())
    }
}
