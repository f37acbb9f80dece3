use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use num_bigint::BigInt;
use once_cell::sync::Lazy;
use thiserror::Error;

const DEFAULT_PORT: u16 = 161;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SnmpError {
    /// The agent did not answer within the configured window. Displays as
    /// `request timeout`, which commands use to classify connection errors.
    #[error("request timeout")]
    Timeout,
    #[error("invalid oid {0:?}")]
    InvalidOid(String),
    #[error("snmp transport failure: {0}")]
    Transport(String),
}

/// An SNMP agent endpoint with its community string.
#[derive(Debug, Clone)]
pub struct Host {
    pub addr: String,
    pub community: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Host {
    pub fn new(addr: impl Into<String>, community: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            community: community.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// Asn1Ber is the type of the SNMP PDU.
// http://www.ietf.org/rfc/rfc1442.txt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Asn1Ber {
    Boolean = 0x01,
    Integer = 0x02,
    BitString = 0x03,
    OctetString = 0x04,
    Null = 0x05,
    ObjectIdentifier = 0x06,
    ObjectDescription = 0x07,
    IpAddress = 0x40,
    Counter32 = 0x41,
    Gauge32 = 0x42,
    TimeTicks = 0x43,
    Opaque = 0x44,
    NsapAddress = 0x45,
    Counter64 = 0x46,
    Uinteger32 = 0x47,
    OpaqueFloat = 0x78,
    OpaqueDouble = 0x79,
    NoSuchObject = 0x80,
    NoSuchInstance = 0x81,
    EndOfMibView = 0x82,
}

/// Raw value carried by a fetched variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    Unsigned(u64),
    Text(String),
    Null,
}

impl SnmpValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SnmpValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The value as an unbounded integer; non-numeric values decode to 0.
    pub fn to_bigint(&self) -> BigInt {
        match self {
            SnmpValue::Integer(value) => BigInt::from(*value),
            SnmpValue::Unsigned(value) => BigInt::from(*value),
            SnmpValue::Text(text) => text.trim().parse().unwrap_or_default(),
            SnmpValue::Null => BigInt::default(),
        }
    }
}

/// One variable binding from an agent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpVariable {
    pub oid: String,
    pub kind: Asn1Ber,
    pub value: SnmpValue,
}

/// Fetches a set of OIDs from an agent in one call.
///
/// The process-wide default getter serves commands that were not handed one
/// explicitly; tests inject their own through
/// [`SnmpCommand::set_getter`](crate::monitor::SnmpCommand::set_getter) or
/// [`set_default_getter`].
#[async_trait]
pub trait SnmpGetter: Send + Sync {
    async fn get(&self, host: &Host, oids: &[String]) -> Result<Vec<SnmpVariable>, SnmpError>;
}

static DEFAULT_GETTER: Lazy<RwLock<Arc<dyn SnmpGetter>>> =
    Lazy::new(|| RwLock::new(Arc::new(Snmp2Getter)));

pub fn default_getter() -> Arc<dyn SnmpGetter> {
    let guard = DEFAULT_GETTER
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&guard)
}

pub fn set_default_getter(getter: Arc<dyn SnmpGetter>) {
    let mut guard = DEFAULT_GETTER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *guard = getter;
}

/// Default getter backed by the `snmp2` crate. The blocking UDP exchange
/// runs on the blocking thread pool.
pub struct Snmp2Getter;

#[async_trait]
impl SnmpGetter for Snmp2Getter {
    async fn get(&self, host: &Host, oids: &[String]) -> Result<Vec<SnmpVariable>, SnmpError> {
        let host = host.clone();
        let oids = oids.to_vec();
        tokio::task::spawn_blocking(move || fetch_blocking(&host, &oids))
            .await
            .map_err(|join_error| SnmpError::Transport(join_error.to_string()))?
    }
}

fn fetch_blocking(host: &Host, oids: &[String]) -> Result<Vec<SnmpVariable>, SnmpError> {
    let target = format!("{}:{}", host.addr, host.port);
    debug!("SNMP: querying {} for {} oid(s)", target, oids.len());

    let mut session = snmp2::SyncSession::new_v2c(
        target.as_str(),
        host.community.as_bytes(),
        Some(host.timeout),
        0,
    )
    .map_err(|error| SnmpError::Transport(format!("{error:?}")))?;

    let mut variables = Vec::with_capacity(oids.len());
    for oid in oids {
        let arcs = parse_oid(oid)?;
        let name = snmp2::Oid::from(arcs.as_slice())
            .map_err(|_| SnmpError::InvalidOid(oid.clone()))?;
        let pdu = session.get(&name).map_err(classify_net_error)?;
        for (oid, value) in pdu.varbinds {
            variables.push(convert_varbind(&oid, &value));
        }
    }
    Ok(variables)
}

/// `1.3.6.1.2.1.1.1.0` or `.1.3.6.1.2.1.1.1.0` into numeric arcs.
fn parse_oid(oid: &str) -> Result<Vec<u64>, SnmpError> {
    oid.trim_start_matches('.')
        .split('.')
        .map(|arc| {
            arc.parse::<u64>()
                .map_err(|_| SnmpError::InvalidOid(oid.to_string()))
        })
        .collect()
}

/// An exhausted receive window surfaces as a receive error in snmp2.
fn classify_net_error<E: std::fmt::Debug>(error: E) -> SnmpError {
    let detail = format!("{error:?}");
    if detail.contains("Receive") {
        SnmpError::Timeout
    } else {
        SnmpError::Transport(detail)
    }
}

fn convert_varbind(oid: &snmp2::Oid, value: &snmp2::Value) -> SnmpVariable {
    use snmp2::Value;

    let (kind, value) = match value {
        Value::Boolean(v) => (Asn1Ber::Boolean, SnmpValue::Integer(i64::from(*v))),
        Value::Integer(v) => (Asn1Ber::Integer, SnmpValue::Integer(*v)),
        Value::OctetString(v) => (
            Asn1Ber::OctetString,
            SnmpValue::Text(String::from_utf8_lossy(v).into_owned()),
        ),
        Value::ObjectIdentifier(v) => (Asn1Ber::ObjectIdentifier, SnmpValue::Text(v.to_string())),
        Value::IpAddress(v) => (
            Asn1Ber::IpAddress,
            SnmpValue::Text(format!("{}.{}.{}.{}", v[0], v[1], v[2], v[3])),
        ),
        Value::Counter32(v) => (Asn1Ber::Counter32, SnmpValue::Unsigned(u64::from(*v))),
        Value::Unsigned32(v) => (Asn1Ber::Gauge32, SnmpValue::Unsigned(u64::from(*v))),
        Value::Timeticks(v) => (Asn1Ber::TimeTicks, SnmpValue::Unsigned(u64::from(*v))),
        Value::Opaque(v) => (
            Asn1Ber::Opaque,
            SnmpValue::Text(String::from_utf8_lossy(v).into_owned()),
        ),
        Value::Counter64(v) => (Asn1Ber::Counter64, SnmpValue::Unsigned(*v)),
        Value::Null => (Asn1Ber::Null, SnmpValue::Null),
        _ => (Asn1Ber::Null, SnmpValue::Null),
    };

    SnmpVariable {
        oid: oid.to_string(),
        kind,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_parsing_accepts_leading_dot() {
        assert_eq!(
            parse_oid(".1.3.6.1.2.1.1.1.0").unwrap(),
            vec![1, 3, 6, 1, 2, 1, 1, 1, 0]
        );
        assert_eq!(parse_oid("1.3.6").unwrap(), vec![1, 3, 6]);
        assert!(parse_oid("1.3.x.6").is_err());
    }

    #[test]
    fn timeout_error_message_is_stable() {
        // commands classify connection errors by this substring
        assert!(SnmpError::Timeout.to_string().contains("request timeout"));
    }

    #[test]
    fn values_decode_to_bigints() {
        assert_eq!(SnmpValue::Integer(-7).to_bigint(), BigInt::from(-7));
        assert_eq!(
            SnmpValue::Unsigned(u64::MAX).to_bigint(),
            BigInt::from(u64::MAX)
        );
        assert_eq!(SnmpValue::Text(" 42 ".into()).to_bigint(), BigInt::from(42));
        assert_eq!(SnmpValue::Text("n/a".into()).to_bigint(), BigInt::from(0));
        assert_eq!(SnmpValue::Null.to_bigint(), BigInt::from(0));
    }
}
