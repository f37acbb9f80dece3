use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;

use crate::handler::Handler;
use crate::incident::Incident;
use crate::result::CheckResult;
use crate::schedule::Schedule;

/// A probe that produces a classified result for a check.
///
/// Commands translate transport timeouts into an UNKNOWN result with reason
/// code `CONNECTION_ERROR` and no error. Any other failure is returned as an
/// error; the dispatcher classifies it as UNKNOWN / `CMD_FAILURE` and reports
/// it through the server's errored callback. The `check` argument gives
/// commands read access to the previous result (for delta computation) and
/// the check's metadata.
#[async_trait]
pub trait Command: Send + Sync {
    async fn run(&self, check: &Check) -> Result<CheckResult>;
}

/// A named monitoring task bundling schedule, command, handlers, and the
/// state left behind by its previous execution.
///
/// Checks are created externally, inserted into a queue, and mutated only by
/// the dispatcher at the end of each execution.
#[derive(Clone)]
pub struct Check {
    pub id: String,
    pub schedule: Arc<dyn Schedule>,
    pub command: Arc<dyn Command>,
    pub handlers: Vec<Arc<dyn Handler>>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_result: Option<CheckResult>,
    pub incident: Option<Incident>,
    pub meta: HashMap<String, String>,
    pub suppress_incidents: bool,
}

impl Check {
    pub fn new(
        id: impl Into<String>,
        schedule: Arc<dyn Schedule>,
        command: Arc<dyn Command>,
    ) -> Self {
        Self {
            id: id.into(),
            schedule,
            command,
            handlers: Vec::new(),
            last_check: None,
            last_result: None,
            incident: None,
            meta: HashMap::new(),
            suppress_incidents: false,
        }
    }

    pub fn with_handlers(mut self, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_meta(mut self, meta: HashMap<String, String>) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_last_check(mut self, at: DateTime<Utc>) -> Self {
        self.last_check = Some(at);
        self
    }

    pub fn with_suppressed_incidents(mut self) -> Self {
        self.suppress_incidents = true;
        self
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.schedule.due_at(self.last_check)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(self.last_check, now)
    }

    /// Debug-logging hook for commands; prefixes the message with the
    /// check's id.
    pub fn debug(&self, message: impl fmt::Display) {
        debug!("CHECK[{}]: {}", self.id, message);
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("last_check", &self.last_check)
            .field("last_result", &self.last_result)
            .field("incident", &self.incident)
            .field("meta", &self.meta)
            .field("suppress_incidents", &self.suppress_incidents)
            .finish_non_exhaustive()
    }
}
