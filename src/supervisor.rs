//! Lifecycle of one running configuration generation

use std::path::Path;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ValidatedConfig};
use crate::scheduler::{Router, QUEUE_CAPACITY};

/// The running tree for one validated configuration: the schedule, the
/// router and, under it, the alerters.
pub struct Supervisor {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the tree. Must be called from within a Tokio runtime.
    pub fn start(config: ValidatedConfig) -> Self {
        let ValidatedConfig {
            schedule,
            alerters,
            context,
        } = config;

        tracing::info!(
            jobs = schedule.len(),
            alerters = alerters.len(),
            "Starting supervisor"
        );

        let token = CancellationToken::new();
        let (alerts_tx, alerts_rx) = mpsc::channel(QUEUE_CAPACITY);

        let schedule_task = tokio::spawn({
            let ctx = context.clone();
            let token = token.clone();
            async move { schedule.run(ctx, alerts_tx, token).await }
        });
        let router_task = tokio::spawn(Router::new(alerters).run(alerts_rx, context, token.clone()));

        Self {
            token,
            tasks: vec![schedule_task, router_task],
        }
    }

    /// Load and validate the config at `path`, then swap trees.
    ///
    /// An invalid config leaves the running tree untouched. Otherwise the
    /// running tree is fully stopped before the new one starts, so job state
    /// and dedup memory start over.
    pub async fn reload(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Config::load(path) {
            Ok(config) => {
                self.shutdown().await;
                let next = Self::start(config);
                tracing::info!(path = %path.display(), "Config reloaded");
                next
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Reload failed, keeping current config"
                );
                self
            }
        }
    }

    /// Cancel every task and wait for all of them to exit
    pub async fn shutdown(self) {
        tracing::info!("Stopping supervisor");
        self.token.cancel();
        for joined in join_all(self.tasks).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Supervisor task failed");
            }
        }
        tracing::info!("Supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Replacement;
    use std::time::Duration;

    /// Always-sending alerter on `hook`, one job polling `/health`
    fn config(url: &str, hook: &str) -> String {
        format!(
            r#"
alerters:
  hook:
    default: true
    always_send: true
    request:
      method: POST
      url: {url}/{hook}
schedule:
  jobs:
    api:
      interval: 20ms
      ok: health
      tests:
        health:
          ok: "status_code == 200"
          request:
            url: {url}/health
"#,
            url = url,
            hook = hook
        )
    }

    fn rewrite(file: &tempfile::NamedTempFile, source: &str) {
        std::fs::write(file.path(), source).unwrap();
    }

    async fn wait_for(mock: &mockito::Mock) {
        let matched = async {
            while !mock.matched_async().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), matched)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let hook = server
            .mock("POST", "/hook")
            .match_body("api Ok core")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let source = format!(
            r#"
alerters:
  hook:
    default: true
    request:
      method: POST
      url: {url}/hook
      body: "{{{{ job }}}} {{{{ state }}}} {{{{ team }}}}"
schedule:
  jobs:
    api:
      interval: 20ms
      ok: health
      values:
        team: core
      tests:
        health:
          ok: "status_code == 200"
          request:
            url: {url}/health
"#,
            url = server.url()
        );
        let config = Config::from_yaml(&source)
            .unwrap()
            .check_with(Replacement::default())
            .unwrap();

        let supervisor = Supervisor::start(config);

        let delivered = async {
            while !hook.matched_async().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), delivered)
            .await
            .unwrap();

        // Several more Ok cycles run, but the state never changes
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .unwrap();
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_reload_keeps_tree_on_invalid_config() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let first = server
            .mock("POST", "/first")
            .with_status(200)
            .create_async()
            .await;

        let file = tempfile::NamedTempFile::new().unwrap();
        rewrite(&file, &config(&server.url(), "first"));
        let supervisor = Supervisor::start(Config::load(file.path()).unwrap());
        wait_for(&first).await;

        rewrite(&file, "schedule: [not, a, schedule");
        let supervisor = supervisor.reload(file.path()).await;

        // The old tree is still delivering
        first.remove_async().await;
        let again = server
            .mock("POST", "/first")
            .with_status(200)
            .create_async()
            .await;
        wait_for(&again).await;

        tokio::time::timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reload_replaces_tree() {
        let mut server = mockito::Server::new_async().await;
        let _health = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let first = server
            .mock("POST", "/first")
            .with_status(200)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/second")
            .with_status(200)
            .create_async()
            .await;

        let file = tempfile::NamedTempFile::new().unwrap();
        rewrite(&file, &config(&server.url(), "first"));
        let supervisor = Supervisor::start(Config::load(file.path()).unwrap());
        wait_for(&first).await;

        rewrite(&file, &config(&server.url(), "second"));
        let supervisor = supervisor.reload(file.path()).await;

        // Only the new tree runs once reload returns
        first.remove_async().await;
        let stale = server
            .mock("POST", "/first")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;
        wait_for(&second).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .unwrap();
        stale.assert_async().await;
    }
}
