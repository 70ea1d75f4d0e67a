//! A single HTTP check
//!
//! Request failures and unreadable bodies mean `NoData`; an expression that
//! evaluates to false means `Alerting`.

use crate::expr::{ComparisonExpression, EvalError, Evaluate};
use crate::http::{Request, Response, RunError};

use super::{ExecContext, State};

/// A single HTTP check with its compiled `ok` expression
#[derive(Debug, Clone)]
pub struct Test {
    name: String,
    ok: ComparisonExpression,
    request: Request,
    response: Response,
}

/// Verdict of one test run
#[derive(Debug)]
pub enum TestOutcome {
    Ok,
    /// The expression evaluated to false
    Alerting(Option<EvalError>),
    /// The check couldn't be carried out
    NoData(RunError),
}

impl TestOutcome {
    pub fn state(&self) -> State {
        match self {
            TestOutcome::Ok => State::Ok,
            TestOutcome::Alerting(_) => State::Alerting,
            TestOutcome::NoData(_) => State::NoData,
        }
    }

    /// Why the test didn't pass, if it didn't
    pub fn reason(&self) -> Option<String> {
        match self {
            TestOutcome::Ok => None,
            TestOutcome::Alerting(e) => e.as_ref().map(ToString::to_string),
            TestOutcome::NoData(e) => Some(e.to_string()),
        }
    }
}

impl Test {
    pub fn new(name: impl Into<String>, ok: ComparisonExpression, request: Request) -> Self {
        Self {
            name: name.into(),
            ok,
            request,
            response: Response::default(),
        }
    }

    /// Set which values to extract from the response
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = response;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send the request, extract values and evaluate `ok` against them
    pub async fn run(&self, ctx: &ExecContext) -> TestOutcome {
        let response = match self.request.run(ctx.client(), ctx.base()).await {
            Ok(response) => response,
            Err(e) => return TestOutcome::NoData(e),
        };

        let values = match self.response.run(response).await {
            Ok(values) => values,
            Err(e) => return TestOutcome::NoData(e),
        };

        let evaluation = self.ok.evaluate(&values);
        if evaluation.passed {
            TestOutcome::Ok
        } else {
            TestOutcome::Alerting(evaluation.error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_comparison_expression;
    use crate::http::Replacement;

    /// URL of a local port nothing listens on
    fn closed_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/", addr)
    }

    fn test_for(url: String, ok: &str) -> Test {
        Test::new(
            "health",
            parse_comparison_expression(ok).unwrap(),
            Request::get(url),
        )
    }

    #[tokio::test]
    async fn test_ok_on_200() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let test = test_for(format!("{}/health", server.url()), "status_code == 200");
        let outcome = test.run(&ExecContext::default()).await;
        assert_eq!(outcome.state(), State::Ok);
        assert_eq!(outcome.reason(), None);
    }

    #[tokio::test]
    async fn test_alerting_on_500() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        let test = test_for(format!("{}/health", server.url()), "status_code == 200");
        let outcome = test.run(&ExecContext::default()).await;
        assert_eq!(outcome.state(), State::Alerting);
        assert_eq!(
            outcome.reason().as_deref(),
            Some("Test Failed: status_code(500) == 200")
        );
    }

    #[tokio::test]
    async fn test_extracted_values() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stats")
            .with_status(200)
            .with_body(r#"{"count": 5, "cluster": {"status": "green"}}"#)
            .create_async()
            .await;

        let test = test_for(
            format!("{}/stats", server.url()),
            r#"count >= 5 && status == "green""#,
        )
        .with_response(
            Response::default()
                .with_extract("count", "count")
                .with_extract("status", "cluster.status"),
        );
        assert_eq!(test.run(&ExecContext::default()).await.state(), State::Ok);
    }

    #[tokio::test]
    async fn test_no_data_on_connection_error() {
        let test = test_for(closed_url(), "status_code == 200");
        let outcome = test.run(&ExecContext::default()).await;
        assert!(matches!(outcome, TestOutcome::NoData(RunError::Http(_))));
    }

    #[tokio::test]
    async fn test_no_data_on_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stats")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let test = test_for(format!("{}/stats", server.url()), "count > 0")
            .with_response(Response::default().with_extract("count", "count"));
        let outcome = test.run(&ExecContext::default()).await;
        assert!(matches!(outcome, TestOutcome::NoData(RunError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn test_body_uses_base_replacement() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .match_body("user=monitor")
            .with_status(200)
            .create_async()
            .await;

        let request = Request::new(reqwest::Method::POST, format!("{}/login", server.url()))
            .with_body("user={{ MONITOR_USER }}");
        let test = Test::new(
            "login",
            parse_comparison_expression("status_code == 200").unwrap(),
            request,
        );
        let ctx = ExecContext::new(
            reqwest::Client::new(),
            Replacement::default().with("MONITOR_USER", "monitor"),
        );

        assert_eq!(test.run(&ctx).await.state(), State::Ok);
        mock.assert_async().await;

        // Without the variable the template can't render
        let outcome = test.run(&ExecContext::default()).await;
        assert!(matches!(outcome, TestOutcome::NoData(RunError::Template(_))));
    }
}
