//! Job scheduling, state tracking and alert routing
//!
//! Each [`Job`] runs on its own task. A job cycle runs all of its tests
//! concurrently, combines their verdicts with the job's `ok` expression and
//! moves the job's debounced [`State`] forward. Every cycle emits one
//! [`Alert`] to the [`Router`], which hands it to the targeted [`Alerter`]s.
//! Each alerter only sends when the state it last delivered for that job
//! changed, unless it is configured to always send.

pub mod alert;
pub mod alerter;
pub mod context;
pub mod job;
pub mod router;
pub mod schedule;
pub mod state;
pub mod test;

pub use alert::Alert;
pub use alerter::{Alerter, DeliveryError, LastSent};
pub use context::ExecContext;
pub use job::{CycleError, CycleOutcome, Job, JobState, Thresholds};
pub use router::Router;
pub use schedule::Schedule;
pub use state::State;
pub use test::{Test, TestOutcome};

/// Capacity of the job-to-router and router-to-alerter queues
pub const QUEUE_CAPACITY: usize = 100;
