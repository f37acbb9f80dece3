use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::Check;

/// Classified outcome of a single check execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultState {
    Ok,
    Warn,
    Crit,
    Unknown,
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultState::Ok => write!(f, "OK"),
            ResultState::Warn => write!(f, "WARN"),
            ResultState::Crit => write!(f, "CRIT"),
            ResultState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMetricKind {
    /// Point-in-time reading.
    Gauge,
    /// Cumulative reading; consumers compute deltas between runs.
    Counter,
}

/// A labelled value produced by a check. Labels are unique within a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetric {
    pub label: String,
    /// Textual decimal representation of the reading.
    pub value: String,
    pub kind: ResultMetricKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub state: ResultState,
    /// Short opaque code explaining a non-OK state; empty when OK.
    pub reason_code: String,
    pub metrics: Vec<ResultMetric>,
}

impl CheckResult {
    pub fn new(
        state: ResultState,
        reason_code: impl Into<String>,
        metrics: Vec<ResultMetric>,
    ) -> Self {
        Self {
            state,
            reason_code: reason_code.into(),
            metrics,
        }
    }

    /// An UNKNOWN result carrying only a reason code.
    pub fn unknown(reason_code: impl Into<String>) -> Self {
        Self::new(ResultState::Unknown, reason_code, Vec::new())
    }

    pub fn metric_by_label(&self, label: &str) -> Option<&ResultMetric> {
        self.metrics.iter().find(|metric| metric.label == label)
    }

    /// Whether this result should open a new incident on the given check.
    pub(crate) fn justifies_new_incident_for(&self, check: &Check) -> bool {
        // incident suppression wins over everything
        if check.suppress_incidents {
            return false;
        }

        // an OK result never opens an incident
        if self.state == ResultState::Ok {
            return false;
        }

        // not OK and an incident is already open: only a different to-state
        // warrants a new one
        if let Some(incident) = &check.incident {
            return incident.to_state != self.state;
        }

        // not OK, no open incident: a prior result with the same state means
        // the transition was already seen
        if let Some(last_result) = &check.last_result {
            return last_result.state != self.state;
        }

        // not OK, no open incident, no prior result
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_strings() {
        assert_eq!(ResultState::Ok.to_string(), "OK");
        assert_eq!(ResultState::Warn.to_string(), "WARN");
        assert_eq!(ResultState::Crit.to_string(), "CRIT");
        assert_eq!(ResultState::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn unknown_result_has_no_metrics() {
        let result = CheckResult::unknown("CONNECTION_ERROR");
        assert_eq!(result.state, ResultState::Unknown);
        assert_eq!(result.reason_code, "CONNECTION_ERROR");
        assert!(result.metrics.is_empty());
    }

    #[test]
    fn metric_lookup_by_label() {
        let result = CheckResult::new(
            ResultState::Ok,
            "",
            vec![
                ResultMetric {
                    label: "ifInOctets".into(),
                    value: "100".into(),
                    kind: ResultMetricKind::Counter,
                },
                ResultMetric {
                    label: "ifOutOctets".into(),
                    value: "200".into(),
                    kind: ResultMetricKind::Counter,
                },
            ],
        );

        assert_eq!(result.metric_by_label("ifOutOctets").unwrap().value, "200");
        assert!(result.metric_by_label("ifSpeed").is_none());
    }
}
