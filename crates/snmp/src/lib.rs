pub mod client;
pub mod monitor;

// Re-export main public APIs
pub use client::{
    default_getter, set_default_getter, Asn1Ber, Host, SnmpError, SnmpGetter, SnmpValue,
    SnmpVariable,
};
pub use monitor::{OidMonitor, SnmpCommand};
