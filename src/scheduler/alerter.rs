//! Outbound alert delivery
//!
//! An [`Alerter`] is immutable configuration. The dedup memory ([`LastSent`])
//! belongs to the alerter's task and starts empty with every configuration
//! generation.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::http::{Replacement, Request, RunError};

use super::{Alert, ExecContext, State};

/// The only status counted as a successful delivery
const DELIVERED: u16 = 200;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Alert request failed: {0}")]
    Request(#[from] RunError),

    #[error("Alert endpoint returned status {0}")]
    Status(u16),
}

/// Last state delivered per job
#[derive(Debug, Default)]
pub struct LastSent {
    states: HashMap<String, State>,
}

impl LastSent {
    /// Decide whether `alert` goes out, recording its state if it does
    pub fn observe(&mut self, alert: &Alert, always_send: bool) -> bool {
        let changed = self.states.get(&alert.job) != Some(&alert.state);
        if changed || always_send {
            self.states.insert(alert.job.clone(), alert.state);
            true
        } else {
            false
        }
    }

    pub fn get(&self, job: &str) -> Option<State> {
        self.states.get(job).copied()
    }
}

#[derive(Debug, Clone)]
pub struct Alerter {
    name: String,
    default: bool,
    always_send: bool,
    request: Request,
}

impl Alerter {
    pub fn new(name: impl Into<String>, request: Request) -> Self {
        Self {
            name: name.into(),
            default: false,
            always_send: false,
            request,
        }
    }

    /// Mark as a default alerter
    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    /// Send on every alert, not only on state changes
    pub fn with_always_send(mut self, always_send: bool) -> Self {
        self.always_send = always_send;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receives alerts that name no alerters
    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn always_send(&self) -> bool {
        self.always_send
    }

    /// Outbound request template
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Template context for `alert`. Job values win over `job` and `state`.
    pub fn replacement(base: &Replacement, alert: &Alert) -> Replacement {
        let mut replacement = base.clone();
        replacement.insert("job", alert.job.as_str());
        replacement.insert("state", alert.state.label());
        replacement.extend(alert.values.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        replacement
    }

    /// Send the alert request, returning the status code on success
    pub async fn deliver(&self, ctx: &ExecContext, alert: &Alert) -> Result<u16, DeliveryError> {
        let replacement = Self::replacement(ctx.base(), alert);
        let response = self.request.run(ctx.client(), &replacement).await?;

        let status = response.status().as_u16();
        if status == DELIVERED {
            Ok(status)
        } else {
            Err(DeliveryError::Status(status))
        }
    }

    /// Dedup and deliver one alert. `None` when the alert was suppressed.
    pub async fn handle(
        &self,
        ctx: &ExecContext,
        last_sent: &mut LastSent,
        alert: &Alert,
    ) -> Option<Result<u16, DeliveryError>> {
        if !last_sent.observe(alert, self.always_send) {
            tracing::debug!(
                alerter = %self.name,
                job = %alert.job,
                state = %alert.state,
                "Alert unchanged, not sending"
            );
            return None;
        }

        let delivery = self.deliver(ctx, alert).await;
        match &delivery {
            Ok(status) => tracing::info!(
                alerter = %self.name,
                job = %alert.job,
                state = %alert.state,
                status_code = status,
                "Alert sent"
            ),
            Err(DeliveryError::Status(status)) => tracing::warn!(
                alerter = %self.name,
                job = %alert.job,
                state = %alert.state,
                status_code = status,
                "Alert failed to send"
            ),
            Err(e) => tracing::warn!(
                alerter = %self.name,
                job = %alert.job,
                state = %alert.state,
                error = %e,
                "Alert errored"
            ),
        }
        Some(delivery)
    }

    /// Deliver alerts from `alerts` until the channel closes or `token` is
    /// cancelled. Failed deliveries are not retried.
    pub async fn run(
        self,
        ctx: ExecContext,
        mut alerts: mpsc::Receiver<Alert>,
        token: CancellationToken,
    ) {
        let mut last_sent = LastSent::default();

        loop {
            let alert = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                alert = alerts.recv() => match alert {
                    Some(alert) => alert,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.handle(&ctx, &mut last_sent, &alert) => {}
            }
        }

        tracing::debug!(alerter = %self.name, "Alerter stopped");
    }
}
