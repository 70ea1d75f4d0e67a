//! Configuration file model and validation
//!
//! The YAML file deserializes into the raw `*Config` types below. Nothing runs
//! from those directly: [`Config::check`] validates the whole tree, compiles
//! every expression, and produces a [`ValidatedConfig`] the scheduler runs.
//! The same path is used at startup and on reload, so a reload that fails
//! validation never touches the running tree.

pub mod duration;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::expr::{parse_comparison_expression, parse_reference_expression, ParseError};
use crate::http::{build_client, parse_method, Replacement, Request, Response};
use crate::scheduler::{Alerter, ExecContext, Job, Schedule, Test, Thresholds};

/// Default time between job cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default HTTP client timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Root of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub alerters: BTreeMap<String, AlerterConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Shared HTTP client settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
    /// PEM bundle of extra trusted roots
    pub ca: Option<PathBuf>,
    /// PEM client certificate, used together with `key`
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlerterConfig {
    pub default: Option<bool>,
    pub always_send: Option<bool>,
    pub request: Option<RequestConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub interval: Option<Duration>,
    pub ok: Option<String>,
    pub pending_after: Option<i64>,
    pub alerting_after: Option<i64>,
    pub ok_after: Option<i64>,
    #[serde(default)]
    pub tests: BTreeMap<String, TestConfig>,
    /// Alerters to notify; `None` means the default ones
    pub alerters: Option<Vec<String>>,
    /// Static values passed along with every alert
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    pub ok: Option<String>,
    pub request: Option<RequestConfig>,
    pub response: Option<ResponseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub method: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    /// Body template
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseConfig {
    /// Value name to JSON path
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
}

/// A configuration that passed validation, ready to run
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub schedule: Schedule,
    pub alerters: BTreeMap<String, Alerter>,
    pub context: ExecContext,
}

impl Config {
    /// Parse a YAML document without validating it
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read and parse a file without validating it
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Read, parse and validate a file. Used for the initial load and reloads.
    pub fn load(path: impl AsRef<Path>) -> Result<ValidatedConfig, ConfigError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading config");
        Self::read(path)?.check()
    }

    /// Validate the whole tree against the current environment
    pub fn check(&self) -> Result<ValidatedConfig, ConfigError> {
        self.check_with(Replacement::from_env())
    }

    /// Validate the whole tree, using `base` as the template context
    pub fn check_with(&self, base: Replacement) -> Result<ValidatedConfig, ConfigError> {
        tracing::info!("Checking config");

        let alerters = self
            .alerters
            .iter()
            .map(|(name, a)| Ok((name.clone(), a.check(name)?)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        let names: BTreeSet<&str> = alerters.keys().map(String::as_str).collect();
        let schedule = self.schedule.check(&names)?;

        let client = build_client(&self.client.clone().unwrap_or_default())?;

        Ok(ValidatedConfig {
            schedule,
            alerters,
            context: ExecContext::new(client, base),
        })
    }
}

impl AlerterConfig {
    pub fn check(&self, name: &str) -> Result<Alerter, ConfigError> {
        let owner = format!("alerter '{}'", name);
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| ConfigError::missing(&owner, "request"))?
            .check(&owner)?;

        Ok(Alerter::new(name, request)
            .with_default(self.default.unwrap_or(false))
            .with_always_send(self.always_send.unwrap_or(false)))
    }
}

impl ScheduleConfig {
    pub fn check(&self, valid_alerters: &BTreeSet<&str>) -> Result<Schedule, ConfigError> {
        let mut schedule = Schedule::default();
        for (name, job) in &self.jobs {
            schedule = schedule.with_job(job.check(name, valid_alerters)?);
        }
        Ok(schedule)
    }
}

impl JobConfig {
    pub fn check(&self, name: &str, valid_alerters: &BTreeSet<&str>) -> Result<Job, ConfigError> {
        let owner = format!("job '{}'", name);

        let source = self
            .ok
            .as_deref()
            .ok_or_else(|| ConfigError::missing(&owner, "ok"))?;
        let ok = parse_reference_expression(source).map_err(|e| ConfigError::expression(&owner, e))?;

        for test in ok.referenced_tests() {
            if !self.tests.contains_key(test) {
                tracing::warn!(job = %name, test = %test, "Job references a test it doesn't define");
            }
        }

        let mut job = Job::new(name, ok)
            .with_interval(self.interval.unwrap_or(DEFAULT_INTERVAL))
            .with_thresholds(Thresholds::new(
                self.pending_after.unwrap_or(0),
                self.alerting_after.unwrap_or(1),
                self.ok_after.unwrap_or(1),
            ));

        for (test_name, test) in &self.tests {
            job = job.with_test(test.check(name, test_name)?);
        }

        if let Some(alerters) = &self.alerters {
            if let Some(unknown) = alerters.iter().find(|a| !valid_alerters.contains(a.as_str())) {
                return Err(ConfigError::UnknownAlerter {
                    owner,
                    alerter: unknown.clone(),
                });
            }
            job = job.with_alerters(alerters.clone());
        }

        for (key, value) in &self.values {
            job = job.with_value(key, value);
        }

        Ok(job)
    }
}

impl TestConfig {
    pub fn check(&self, job: &str, name: &str) -> Result<Test, ConfigError> {
        let owner = format!("test '{}.{}'", job, name);

        let source = self
            .ok
            .as_deref()
            .ok_or_else(|| ConfigError::missing(&owner, "ok"))?;
        let ok = parse_comparison_expression(source).map_err(|e| ConfigError::expression(&owner, e))?;

        let request = self
            .request
            .as_ref()
            .ok_or_else(|| ConfigError::missing(&owner, "request"))?
            .check(&owner)?;

        let response = self
            .response
            .as_ref()
            .map(|r| Response::new(r.extract.clone()))
            .unwrap_or_default();

        Ok(Test::new(name, ok, request).with_response(response))
    }
}

impl RequestConfig {
    pub fn check(&self, owner: &str) -> Result<Request, ConfigError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::missing(owner, "url"))?;
        reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            owner: owner.to_string(),
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let method = self.method.as_deref().unwrap_or("GET");
        let method = parse_method(method).ok_or_else(|| ConfigError::InvalidMethod {
            owner: owner.to_string(),
            method: method.to_uppercase(),
        })?;

        let mut request = Request::new(method, url);
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }
        for (name, value) in &self.query_params {
            request = request.with_query_param(name, value);
        }
        if let Some(body) = &self.body {
            request = request.with_body(body);
        }

        Ok(request)
    }
}

/// Configuration errors; fatal at startup, reload-aborting afterwards
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{owner}: '{field}' is required")]
    MissingField { owner: String, field: &'static str },

    #[error("{owner}: method '{method}' isn't valid")]
    InvalidMethod { owner: String, method: String },

    #[error("{owner}: invalid URL '{url}': {reason}")]
    InvalidUrl {
        owner: String,
        url: String,
        reason: String,
    },

    #[error("{owner}: invalid ok expression: {source}")]
    Expression {
        owner: String,
        #[source]
        source: ParseError,
    },

    #[error("{owner}: alerter '{alerter}' was not found")]
    UnknownAlerter { owner: String, alerter: String },

    #[error("HTTP client: {0}")]
    Client(String),
}

impl ConfigError {
    fn missing(owner: &str, field: &'static str) -> Self {
        ConfigError::MissingField {
            owner: owner.to_string(),
            field,
        }
    }

    fn expression(owner: &str, source: ParseError) -> Self {
        ConfigError::Expression {
            owner: owner.to_string(),
            source,
        }
    }
}
