use chrono::{DateTime, Duration, Utc};

/// Due-time predicate for a check.
///
/// Implementations are plugged into checks as shared trait objects; the
/// queue and the dispatcher only ever ask the two questions below.
pub trait Schedule: Send + Sync {
    /// The next instant at which a check with the given last-check time
    /// should run. With no last-check time the check is due immediately.
    fn due_at(&self, last_check: Option<DateTime<Utc>>) -> DateTime<Utc>;

    fn is_due(&self, last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        now >= self.due_at(last_check)
    }
}

/// Fixed-interval schedule: due `interval_seconds` after the last run.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicSchedule {
    pub interval_seconds: u32,
}

impl PeriodicSchedule {
    pub fn new(interval_seconds: u32) -> Self {
        Self { interval_seconds }
    }
}

impl Schedule for PeriodicSchedule {
    fn due_at(&self, last_check: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match last_check {
            Some(last) => last + Duration::seconds(i64::from(self.interval_seconds)),
            None => Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_interval_after_last_check() {
        let schedule = PeriodicSchedule::new(60);
        let last = Utc::now() - Duration::seconds(30);
        assert_eq!(schedule.due_at(Some(last)), last + Duration::seconds(60));
        assert!(!schedule.is_due(Some(last), Utc::now()));
    }

    #[test]
    fn due_immediately_without_last_check() {
        let schedule = PeriodicSchedule::new(60);
        // due_at falls back to "now", so the check is due right away
        assert!(schedule.is_due(None, Utc::now() + Duration::seconds(1)));
    }

    #[test]
    fn due_at_boundary_is_inclusive() {
        let schedule = PeriodicSchedule::new(10);
        let last = Utc::now() - Duration::seconds(10);
        let due = schedule.due_at(Some(last));
        assert!(schedule.is_due(Some(last), due));
    }

    #[test]
    fn overdue_check_is_due() {
        let schedule = PeriodicSchedule::new(10);
        let last = Utc::now() - Duration::seconds(3600);
        assert!(schedule.is_due(Some(last), Utc::now()));
    }
}
