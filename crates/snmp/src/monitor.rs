use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive};
use num_bigint::BigInt;

use vigilo_poller::check::{Check, Command};
use vigilo_poller::result::{CheckResult, ResultMetric, ResultMetricKind, ResultState};

use crate::client::{default_getter, Asn1Ber, Host, SnmpGetter};

/// Threshold rules and reason codes for one monitored OID.
///
/// A threshold participates only when its reason code is non-empty. The
/// rules are evaluated in a fixed priority order: crit-min, warn-min,
/// crit-max, warn-max; first match wins.
#[derive(Debug, Clone)]
pub struct OidMonitor {
    pub oid: String,
    pub name: String,
    /// Multiplier applied to gauge values after threshold evaluation, before
    /// the metric is recorded. Never applied to counters.
    pub post_process_value: f64,
    pub warn_min_threshold: f64,
    pub crit_min_threshold: f64,
    pub warn_max_threshold: f64,
    pub crit_max_threshold: f64,
    pub warn_min_reason_code: String,
    pub crit_min_reason_code: String,
    pub warn_max_reason_code: String,
    pub crit_max_reason_code: String,
}

impl OidMonitor {
    pub fn new(oid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            name: name.into(),
            post_process_value: 1.0,
            warn_min_threshold: 0.0,
            crit_min_threshold: 0.0,
            warn_max_threshold: 0.0,
            crit_max_threshold: 0.0,
            warn_min_reason_code: String::new(),
            crit_min_reason_code: String::new(),
            warn_max_reason_code: String::new(),
            crit_max_reason_code: String::new(),
        }
    }

    fn state_and_reason_for(&self, value: &BigDecimal) -> (ResultState, String) {
        if !self.crit_min_reason_code.is_empty() && below(value, self.crit_min_threshold) {
            return (ResultState::Crit, self.crit_min_reason_code.clone());
        }
        if !self.warn_min_reason_code.is_empty() && below(value, self.warn_min_threshold) {
            return (ResultState::Warn, self.warn_min_reason_code.clone());
        }
        if !self.crit_max_reason_code.is_empty() && above(value, self.crit_max_threshold) {
            return (ResultState::Crit, self.crit_max_reason_code.clone());
        }
        if !self.warn_max_reason_code.is_empty() && above(value, self.warn_max_threshold) {
            return (ResultState::Warn, self.warn_max_reason_code.clone());
        }
        (ResultState::Ok, String::new())
    }
}

fn below(value: &BigDecimal, threshold: f64) -> bool {
    BigDecimal::from_f64(threshold).is_some_and(|threshold| *value < threshold)
}

fn above(value: &BigDecimal, threshold: f64) -> bool {
    BigDecimal::from_f64(threshold).is_some_and(|threshold| *value > threshold)
}

/// Command that fetches a set of OIDs from one host and classifies the
/// readings through their monitors' thresholds.
///
/// Counter values are compared as deltas against the check's previous
/// metrics (with 32/64-bit rollover handling); gauge values are compared
/// directly. The first monitor that trips a threshold decides the result
/// state; later monitors still contribute metrics but are not consulted,
/// so an earlier WARN is never upgraded by a later CRIT.
pub struct SnmpCommand {
    getter: Option<Arc<dyn SnmpGetter>>,
    pub host: Host,
    pub monitors: Vec<OidMonitor>,
}

impl SnmpCommand {
    pub fn new(
        addr: impl Into<String>,
        community: impl Into<String>,
        monitors: Vec<OidMonitor>,
    ) -> Self {
        Self {
            getter: None,
            host: Host::new(addr, community),
            monitors,
        }
    }

    /// Override the process-wide default getter for this command.
    pub fn set_getter(&mut self, getter: Arc<dyn SnmpGetter>) {
        self.getter = Some(getter);
    }

    pub fn with_getter(mut self, getter: Arc<dyn SnmpGetter>) -> Self {
        self.set_getter(getter);
        self
    }

    fn getter(&self) -> Arc<dyn SnmpGetter> {
        self.getter.clone().unwrap_or_else(default_getter)
    }
}

#[async_trait]
impl Command for SnmpCommand {
    async fn run(&self, check: &Check) -> Result<CheckResult> {
        // oid -> monitor fingerprint for response processing
        let monitors_by_oid: HashMap<&str, &OidMonitor> = self
            .monitors
            .iter()
            .map(|monitor| (monitor.oid.as_str(), monitor))
            .collect();
        let oids: Vec<String> = self
            .monitors
            .iter()
            .map(|monitor| monitor.oid.clone())
            .collect();

        check.debug(format!("oid(s) to fetch: {oids:?}"));

        let variables = match self.getter().get(&self.host, &oids).await {
            Ok(variables) => variables,
            Err(error) if error.to_string().contains("request timeout") => {
                return Ok(CheckResult::unknown("CONNECTION_ERROR"));
            }
            Err(error) => return Err(error.into()),
        };

        let mut state = ResultState::Unknown;
        let mut reason = String::new();
        let mut metrics = Vec::with_capacity(variables.len());

        for variable in &variables {
            check.debug(format!(
                "got oid={} value={:?}",
                variable.oid, variable.value
            ));

            // agents vary on the canonical leading dot
            let monitor = monitors_by_oid
                .get(variable.oid.as_str())
                .or_else(|| {
                    variable
                        .oid
                        .strip_prefix('.')
                        .and_then(|stripped| monitors_by_oid.get(stripped))
                })
                .copied()
                .ok_or_else(|| {
                    anyhow!("oid {} could not be found in monitors", variable.oid)
                })?;

            match variable.kind {
                Asn1Ber::Counter32 | Asn1Ber::Counter64 => {
                    let value = variable.value.to_bigint();

                    // counters record the raw reading; the post-process
                    // multiplier never applies
                    metrics.push(ResultMetric {
                        label: monitor.name.clone(),
                        value: value.to_string(),
                        kind: ResultMetricKind::Counter,
                    });

                    if state == ResultState::Unknown {
                        let previous = last_metric_value(check, &monitor.name);
                        let width = if variable.kind == Asn1Ber::Counter64 {
                            64
                        } else {
                            32
                        };
                        let diff = counter_diff(&previous, &value, width);
                        check.debug(format!(
                            "counter {} delta {} (previous {})",
                            monitor.name, diff, previous
                        ));
                        (state, reason) = monitor.state_and_reason_for(&BigDecimal::from(diff));
                    }
                }
                _ => {
                    let value = match variable.value.as_text() {
                        Some(text) => parse_decimal(check, text),
                        None => BigDecimal::from(variable.value.to_bigint()),
                    };

                    // thresholds see the raw value; the recorded metric is
                    // post-processed
                    if state == ResultState::Unknown {
                        (state, reason) = monitor.state_and_reason_for(&value);
                    }

                    metrics.push(ResultMetric {
                        label: monitor.name.clone(),
                        value: post_process(&value, monitor.post_process_value).to_string(),
                        kind: ResultMetricKind::Gauge,
                    });
                }
            }
        }

        Ok(CheckResult::new(state, reason, metrics))
    }
}

fn parse_decimal(check: &Check, raw: &str) -> BigDecimal {
    let trimmed = raw.trim();
    match trimmed.parse::<BigDecimal>() {
        Ok(value) => value,
        Err(_) => {
            check.debug(format!("failed to parse {trimmed:?} as a decimal, using 0"));
            BigDecimal::from(0)
        }
    }
}

/// Previous reading for `label` from the check's last result; 0 when the
/// metric is missing or unparsable.
fn last_metric_value(check: &Check, label: &str) -> BigInt {
    check
        .last_result
        .as_ref()
        .and_then(|result| result.metric_by_label(label))
        .and_then(|metric| metric.value.parse().ok())
        .unwrap_or_default()
}

/// Delta between consecutive counter readings, accounting for rollover at
/// the counter's bit width.
fn counter_diff(previous: &BigInt, current: &BigInt, width: u32) -> BigInt {
    if current < previous {
        (BigInt::from(1u8) << width) - previous + current
    } else {
        current - previous
    }
}

fn post_process(value: &BigDecimal, multiplier: f64) -> BigDecimal {
    match BigDecimal::from_f64(multiplier) {
        Some(multiplier) => value * multiplier,
        None => value.clone(),
    }
}
