use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde_json::json;

use vigilo_poller::check::Check;
use vigilo_poller::handler::Handler;
use vigilo_poller::incident::Incident;
use vigilo_poller::result::CheckResult;

/// Logs every completed check as a single JSON line.
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn process(
        &self,
        check: &Check,
        result: &CheckResult,
        _previous_result: Option<&CheckResult>,
        incident: Option<&Incident>,
    ) -> Result<()> {
        let line = json!({
            "check": check.id,
            "state": result.state.to_string(),
            "reason": result.reason_code,
            "metrics": result.metrics,
            "incident_open": incident.is_some(),
        });
        info!("RESULT: {line}");
        Ok(())
    }
}
