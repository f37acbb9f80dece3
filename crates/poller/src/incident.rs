use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::{CheckResult, ResultState};

/// A persistent record of a non-OK state transition, open until the check
/// returns to OK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// State the check was in before the transition, when known.
    pub from_state: Option<ResultState>,
    /// State that opened the incident. Never OK while the incident is open.
    pub to_state: ResultState,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub reason_code: String,
    pub acknowledged: bool,
}

impl Incident {
    /// Build an incident for the transition from `previous` to `current`.
    pub fn from_results(previous: Option<&CheckResult>, current: &CheckResult) -> Self {
        let now = Utc::now();
        Self {
            from_state: previous.map(|result| result.state),
            to_state: current.state,
            first_seen: now,
            last_seen: now,
            reason_code: current.reason_code.clone(),
            acknowledged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_captures_both_states() {
        let previous = CheckResult::new(ResultState::Ok, "", Vec::new());
        let current = CheckResult::new(ResultState::Crit, "PACKET_LOSS", Vec::new());

        let incident = Incident::from_results(Some(&previous), &current);
        assert_eq!(incident.from_state, Some(ResultState::Ok));
        assert_eq!(incident.to_state, ResultState::Crit);
        assert_eq!(incident.reason_code, "PACKET_LOSS");
        assert!(!incident.acknowledged);
        assert_eq!(incident.first_seen, incident.last_seen);
    }

    #[test]
    fn transition_without_prior_result() {
        let current = CheckResult::new(ResultState::Warn, "HIGH_RTT", Vec::new());
        let incident = Incident::from_results(None, &current);
        assert_eq!(incident.from_state, None);
        assert_eq!(incident.to_state, ResultState::Warn);
    }
}
