//! Request body templates rendered with minijinja.
//!
//! Undefined variables are an error, so a body referencing a value that isn't
//! in the replacement never goes out with a silent blank in it.

use std::sync::OnceLock;

use minijinja::{Environment, UndefinedBehavior};

use super::Replacement;

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env
    })
}

/// Render `template` with the replacement as its context
pub fn render(template: &str, replacement: &Replacement) -> Result<String, minijinja::Error> {
    let rendered = environment().render_str(template, replacement);
    if let Err(e) = &rendered {
        tracing::debug!(error = %e, "Failed to render request template");
    }
    rendered
}
