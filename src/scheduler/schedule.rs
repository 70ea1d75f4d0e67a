//! The set of jobs of one configuration generation

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Alert, ExecContext, Job};

/// Every configured job, by name
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    jobs: BTreeMap<String, Arc<Job>>,
}

impl Schedule {
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.insert(job.name().to_string(), Arc::new(job));
        self
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name).map(Arc::as_ref)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every job on its own task until `token` is cancelled
    pub async fn run(&self, ctx: ExecContext, alerts: mpsc::Sender<Alert>, token: CancellationToken) {
        tracing::info!(jobs = self.jobs.len(), "Starting schedule");

        let mut tasks = JoinSet::new();
        for job in self.jobs.values() {
            tasks.spawn(Arc::clone(job).run(ctx.clone(), alerts.clone(), token.clone()));
        }
        drop(alerts);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Job task failed");
            }
        }
        tracing::info!("Schedule stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_comparison_expression, parse_reference_expression};
    use crate::http::Request;
    use crate::scheduler::{State, Test};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn job(name: &str, url: String) -> Job {
        Job::new(name, parse_reference_expression("health").unwrap())
            .with_interval(Duration::from_millis(20))
            .with_test(Test::new(
                "health",
                parse_comparison_expression("status_code == 200").unwrap(),
                Request::get(url),
            ))
    }

    #[test]
    fn test_lookup() {
        let schedule = Schedule::default()
            .with_job(job("api", "http://localhost/".to_string()))
            .with_job(job("web", "http://localhost/".to_string()));
        assert_eq!(schedule.len(), 2);
        assert!(!schedule.is_empty());
        assert_eq!(schedule.job("api").map(Job::name), Some("api"));
        assert!(schedule.job("db").is_none());
        assert_eq!(schedule.jobs().count(), 2);
    }

    #[tokio::test]
    async fn test_run_all_jobs() {
        let mut server = mockito::Server::new_async().await;
        let _up = server.mock("GET", "/up").with_status(200).create_async().await;
        let _down = server
            .mock("GET", "/down")
            .with_status(500)
            .create_async()
            .await;

        let schedule = Schedule::default()
            .with_job(job("api", format!("{}/up", server.url())))
            .with_job(job("web", format!("{}/down", server.url())));

        let (tx, mut rx) = mpsc::channel(10);
        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let token = token.clone();
            async move { schedule.run(ExecContext::default(), tx, token).await }
        });

        let mut seen = BTreeSet::new();
        while seen.len() < 2 {
            let alert = rx.recv().await.unwrap();
            let expected = if alert.job == "api" { State::Ok } else { State::Alerting };
            assert_eq!(alert.state, expected);
            seen.insert(alert.job);
        }

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
