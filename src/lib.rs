//! Upwatch: uptime monitoring with debounced job health
//!
//! Jobs run HTTP tests on an interval. Each test checks its response with a
//! small comparison language (`status_code == 200 && queue < 100`), and a job
//! combines its tests by name (`health && stats || fallback`, folded left to
//! right). The combined verdict drives a debounced state machine (`Ok`,
//! `Pending`, `Alerting`, `No_Data`), and every cycle's state is routed to
//! webhook alerters that only send when the state they last delivered for a
//! job changed.
//!
//! # Example
//!
//! ```no_run
//! use upwatch::config::Config;
//! use upwatch::supervisor::Supervisor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("upwatch.yaml")?;
//! let supervisor = Supervisor::start(config);
//! tokio::signal::ctrl_c().await?;
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod expr;
pub mod http;
pub mod logging;
pub mod scheduler;
pub mod supervisor;

pub use config::{Config, ConfigError, ValidatedConfig};
pub use expr::{EvalError, Evaluate, Evaluation, ParseError};
pub use http::{Replacement, Request, Response, RunError};
pub use logging::{LogGuard, LogOptions, LoggingError};
pub use scheduler::{Alert, Alerter, ExecContext, Job, Schedule, State, Test};
pub use supervisor::Supervisor;
