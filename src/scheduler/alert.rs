//! Per-cycle job alerts

use std::collections::BTreeMap;

use super::State;

/// Message emitted by a job once per cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub job: String,
    pub state: State,
    /// Explicit targets; `None` routes to the default alerters
    pub alerters: Option<Vec<String>>,
    /// The job's static values
    pub values: BTreeMap<String, String>,
}

impl Alert {
    pub fn new(job: impl Into<String>, state: State) -> Self {
        Self {
            job: job.into(),
            state,
            alerters: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_alerters(mut self, alerters: Vec<String>) -> Self {
        self.alerters = Some(alerters);
        self
    }

    pub fn with_values(mut self, values: BTreeMap<String, String>) -> Self {
        self.values = values;
        self
    }
}
