pub mod check;
pub mod handler;
pub mod incident;
pub mod queue;
pub mod result;
pub mod schedule;
pub mod server;

// Re-export main public APIs
pub use check::{Check, Command};
pub use handler::Handler;
pub use incident::Incident;
pub use queue::{CheckQueue, MemoryCheckQueue};
pub use result::{CheckResult, ResultMetric, ResultMetricKind, ResultState};
pub use schedule::{PeriodicSchedule, Schedule};
pub use server::{Server, ServerConfig};
