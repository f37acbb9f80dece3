use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Error;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::check::Check;
use crate::incident::Incident;
use crate::queue::CheckQueue;
use crate::result::{CheckResult, ResultState};

/// How long the producer sleeps when the queue has nothing due.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub type CheckExecutingCallback = Arc<dyn Fn(&Check) + Send + Sync>;
pub type CheckErroredCallback = Arc<dyn Fn(&Check, &Error) + Send + Sync>;
pub type CheckFinishedCallback = Arc<dyn Fn(&Check, Duration) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on concurrently executing checks.
    pub max_running_checks: usize,
    /// Re-enqueue each check after execution so it runs again at its next
    /// due time.
    pub auto_re_enqueue: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_running_checks: 100,
            auto_re_enqueue: true,
        }
    }
}

/// The dispatcher: drains due checks from the queue and executes them with
/// bounded parallelism until cancelled.
pub struct Server {
    config: ServerConfig,
    queue: Arc<dyn CheckQueue>,
    pub on_check_executing: Option<CheckExecutingCallback>,
    pub on_check_errored: Option<CheckErroredCallback>,
    pub on_check_finished: Option<CheckFinishedCallback>,
}

impl Server {
    pub fn new(config: ServerConfig, queue: Arc<dyn CheckQueue>) -> Self {
        Self {
            config,
            queue,
            on_check_executing: None,
            on_check_errored: None,
            on_check_finished: None,
        }
    }

    /// Run until `shutdown` fires, then drain.
    ///
    /// On cancellation the producer stops dequeueing, in-flight executions
    /// run to completion, and checks that were buffered but never admitted
    /// go back to the queue; no check is lost.
    pub async fn run(&self, shutdown: CancellationToken) {
        let (handoff_tx, mut handoff_rx) = mpsc::channel::<Check>(self.config.max_running_checks);
        let admission = Arc::new(Semaphore::new(self.config.max_running_checks));
        let mut running = JoinSet::new();

        let producer = tokio::spawn(produce(
            Arc::clone(&self.queue),
            handoff_tx,
            shutdown.clone(),
        ));

        info!(
            "SERVER: running up to {} concurrent checks",
            self.config.max_running_checks
        );

        loop {
            let check = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = handoff_rx.recv() => match received {
                    Some(check) => check,
                    None => break,
                },
            };

            // admission blocks when max_running_checks executions are in
            // flight; the check in hand goes back to the queue if shutdown
            // fires first
            let permit = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.queue.enqueue(check).await;
                    break;
                }
                permit = Arc::clone(&admission).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.queue.enqueue(check).await;
                        break;
                    }
                },
            };

            let context = ExecutionContext {
                queue: Arc::clone(&self.queue),
                auto_re_enqueue: self.config.auto_re_enqueue,
                on_check_executing: self.on_check_executing.clone(),
                on_check_errored: self.on_check_errored.clone(),
                on_check_finished: self.on_check_finished.clone(),
            };
            running.spawn(async move {
                execute(check, context).await;
                drop(permit);
            });
        }

        // in-flight executions run to completion, no forced abort
        while running.join_next().await.is_some() {}
        let _ = producer.await;

        // hand buffered but never-admitted checks back to the queue
        while let Ok(check) = handoff_rx.try_recv() {
            if self.config.auto_re_enqueue {
                self.queue.enqueue(check).await;
            }
        }

        info!("SERVER: stopped");
    }
}

/// Feeds the handoff channel from the queue, reserving channel capacity
/// before dequeueing so a pulled check always has somewhere to go. Closes
/// the handoff on cancellation.
async fn produce(
    queue: Arc<dyn CheckQueue>,
    handoff: mpsc::Sender<Check>,
    shutdown: CancellationToken,
) {
    loop {
        let slot = tokio::select! {
            _ = shutdown.cancelled() => break,
            slot = handoff.reserve() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        match queue.dequeue().await {
            Some(check) => {
                debug!("SERVER: check {} pulled for execution", check.id);
                slot.send(check);
            }
            None => {
                drop(slot);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {}
                }
            }
        }
    }
    // dropping the sender closes the handoff and ends the consumer loop
}

#[derive(Clone)]
struct ExecutionContext {
    queue: Arc<dyn CheckQueue>,
    auto_re_enqueue: bool,
    on_check_executing: Option<CheckExecutingCallback>,
    on_check_errored: Option<CheckErroredCallback>,
    on_check_finished: Option<CheckFinishedCallback>,
}

/// The per-check pipeline: command, incident detection, state persistence,
/// handler fan-out, callbacks, re-enqueue.
async fn execute(mut check: Check, context: ExecutionContext) {
    if let Some(callback) = &context.on_check_executing {
        callback(&check);
    }

    let started_at = Utc::now();
    let timer = Instant::now();

    let command = Arc::clone(&check.command);
    let outcome = command.run(&check).await;

    let (result, error) = match outcome {
        Ok(result) => (result, None),
        Err(error) => (CheckResult::unknown("CMD_FAILURE"), Some(error)),
    };

    apply_incident_policy(&mut check, &result);

    let previous_result = check.last_result.replace(result.clone());
    check.last_check = Some(started_at);

    for handler in &check.handlers {
        if let Err(error) = handler
            .process(
                &check,
                &result,
                previous_result.as_ref(),
                check.incident.as_ref(),
            )
            .await
        {
            warn!("SERVER: handler failed for check {}: {:#}", check.id, error);
        }
    }

    if let Some(error) = &error {
        if let Some(callback) = &context.on_check_errored {
            callback(&check, error);
        }
    }
    if let Some(callback) = &context.on_check_finished {
        callback(&check, timer.elapsed());
    }

    if context.auto_re_enqueue {
        context.queue.enqueue(check).await;
    }
}

/// Open, extend, or close the check's incident based on the new result.
fn apply_incident_policy(check: &mut Check, result: &CheckResult) {
    if result.state == ResultState::Ok {
        if let Some(incident) = check.incident.take() {
            debug!(
                "SERVER: check {} recovered from {} incident first seen {}",
                check.id, incident.to_state, incident.first_seen
            );
        }
        return;
    }

    if result.justifies_new_incident_for(check) {
        info!(
            "SERVER: check {} transitioned to {} ({}), opening incident",
            check.id, result.state, result.reason_code
        );
        check.incident = Some(Incident::from_results(check.last_result.as_ref(), result));
    } else if let Some(incident) = check.incident.as_mut() {
        if incident.to_state == result.state {
            incident.last_seen = Utc::now();
        }
    }
}
