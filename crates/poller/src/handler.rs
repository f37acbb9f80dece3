use anyhow::Result;
use async_trait::async_trait;

use crate::check::Check;
use crate::incident::Incident;
use crate::result::CheckResult;

/// Post-result side-effect sink.
///
/// Handlers run sequentially in the order they are declared on the check,
/// after the command has finished and incident detection has been applied.
/// A failing handler is logged and never interrupts the pipeline.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn process(
        &self,
        check: &Check,
        result: &CheckResult,
        previous_result: Option<&CheckResult>,
        incident: Option<&Incident>,
    ) -> Result<()>;
}
