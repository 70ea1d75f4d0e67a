//! Alert routing from jobs to alerters

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Alert, Alerter, ExecContext, QUEUE_CAPACITY};

/// Fans alerts out to alerter tasks
#[derive(Debug, Clone, Default)]
pub struct Router {
    alerters: BTreeMap<String, Alerter>,
}

impl Router {
    pub fn new(alerters: BTreeMap<String, Alerter>) -> Self {
        Self { alerters }
    }

    /// Alerters `alert` goes to: its own list, or every default alerter
    pub fn targets(&self, alert: &Alert) -> Vec<String> {
        match &alert.alerters {
            Some(names) => names.clone(),
            None => self
                .alerters
                .iter()
                .filter(|(_, alerter)| alerter.is_default())
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// Start one task per alerter and route `alerts` to them until every
    /// sender is gone or `token` is cancelled.
    ///
    /// Alerter queues are bounded; a full queue blocks routing for everyone.
    pub async fn run(
        self,
        mut alerts: mpsc::Receiver<Alert>,
        ctx: ExecContext,
        token: CancellationToken,
    ) {
        let mut queues = BTreeMap::new();
        let mut tasks = JoinSet::new();
        for (name, alerter) in &self.alerters {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            queues.insert(name.clone(), tx);
            tasks.spawn(alerter.clone().run(ctx.clone(), rx, token.clone()));
        }
        tracing::info!(alerters = queues.len(), "Router started");

        'route: loop {
            let alert = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                alert = alerts.recv() => match alert {
                    Some(alert) => alert,
                    None => break,
                },
            };

            for name in self.targets(&alert) {
                let Some(queue) = queues.get(&name) else {
                    tracing::warn!(alerter = %name, job = %alert.job, "Dropping alert for unknown alerter");
                    continue;
                };

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break 'route,
                    sent = queue.send(alert.clone()) => {
                        if sent.is_err() {
                            tracing::warn!(alerter = %name, job = %alert.job, "Alerter queue closed");
                        }
                    }
                }
            }
        }

        drop(queues);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Alerter task failed");
            }
        }
        tracing::info!("Router stopped");
    }
}
