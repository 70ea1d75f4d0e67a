//! Job health states

use std::fmt;

/// Health state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    Ok,
    Pending,
    Alerting,
    /// No verdict could be reached; also the state every job starts in
    #[default]
    NoData,
}

impl State {
    /// Label used in logs and alert templates
    pub fn label(self) -> &'static str {
        match self {
            State::Ok => "Ok",
            State::Pending => "Pending",
            State::Alerting => "Alerting",
            State::NoData => "No_Data",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
