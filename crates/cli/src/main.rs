//! Vigilo CLI - monitoring poller entry point
//!
//! Builds one SNMP check per target, runs the dispatcher, and drains
//! gracefully on SIGINT.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use vigilo_poller::check::Check;
use vigilo_poller::handler::Handler;
use vigilo_poller::queue::{CheckQueue, MemoryCheckQueue};
use vigilo_poller::schedule::PeriodicSchedule;
use vigilo_poller::server::{Server, ServerConfig};
use vigilo_snmp::monitor::{OidMonitor, SnmpCommand};

mod handler;

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

#[derive(Parser)]
#[command(name = "vigilo")]
#[command(about = "Vigilo monitoring poller", version)]
struct Cli {
    /// Set the logging level (overrides RUST_LOG environment variable)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// SNMP agent address to poll (repeatable)
    #[arg(long, value_name = "ADDR", required = true)]
    target: Vec<String>,

    /// SNMP community string
    #[arg(long, default_value = "public")]
    community: String,

    /// Poll interval in seconds
    #[arg(long, default_value_t = 60)]
    interval: u32,

    /// OID to monitor, as LABEL=OID (repeatable)
    #[arg(long = "oid", value_name = "LABEL=OID", required = true)]
    oids: Vec<String>,

    /// Warn when a gauge reading or counter delta exceeds this value
    #[arg(long, value_name = "VALUE")]
    warn_max: Option<f64>,

    /// Go critical when a gauge reading or counter delta exceeds this value
    #[arg(long, value_name = "VALUE")]
    crit_max: Option<f64>,

    /// Maximum number of concurrently executing checks
    #[arg(long, default_value_t = 100)]
    max_running_checks: usize,
}

impl Cli {
    fn monitors(&self) -> Result<Vec<OidMonitor>> {
        self.oids
            .iter()
            .map(|entry| {
                let Some((label, oid)) = entry.split_once('=') else {
                    bail!("malformed --oid {entry:?}, expected LABEL=OID");
                };
                let mut monitor = OidMonitor::new(oid, label);
                if let Some(threshold) = self.warn_max {
                    monitor.warn_max_threshold = threshold;
                    monitor.warn_max_reason_code = "HIGH_VALUE".into();
                }
                if let Some(threshold) = self.crit_max {
                    monitor.crit_max_threshold = threshold;
                    monitor.crit_max_reason_code = "EXCESSIVE_VALUE".into();
                }
                Ok(monitor)
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if let Some(level) = &cli.log_level {
        logger.filter_level(level.to_level_filter());
    }
    logger.init();

    let monitors = cli.monitors().context("parsing --oid arguments")?;

    let queue: Arc<dyn CheckQueue> = Arc::new(MemoryCheckQueue::new());
    let schedule = Arc::new(PeriodicSchedule::new(cli.interval));
    let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(handler::LogHandler)];

    for target in &cli.target {
        let command = Arc::new(SnmpCommand::new(
            target.clone(),
            cli.community.clone(),
            monitors.clone(),
        ));
        let check = Check::new(format!("snmp:{target}"), schedule.clone(), command)
            .with_handlers(handlers.clone())
            .with_meta(HashMap::from([("target".to_string(), target.clone())]));
        queue.enqueue(check).await;
    }
    info!("enqueued {} check(s)", queue.count().await);

    let mut server = Server::new(
        ServerConfig {
            max_running_checks: cli.max_running_checks,
            ..Default::default()
        },
        Arc::clone(&queue),
    );
    server.on_check_errored = Some(Arc::new(|check, err| {
        error!("CHECK ERROR: {} failed: {err:#}", check.id);
    }));
    server.on_check_finished = Some(Arc::new(|check, elapsed| {
        info!(
            "check {} finished execution ({:.3} seconds)",
            check.id,
            elapsed.as_secs_f64()
        );
    }));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stopping server...");
                shutdown.cancel();
            }
        }
    });

    server.run(shutdown).await;

    // drop whatever the drain put back before exiting
    queue.flush().await;
    info!("exiting");
    Ok(())
}
