//! Observability subsystem for factline
//!
//! Two channels with different guarantees:
//! - `audit`: the append-only compliance trail. Writes are part of the
//!   operation and their failures propagate.
//! - `tracing`: diagnostic logs. Best-effort, filtered by `RUST_LOG`.

pub mod audit;

pub use audit::{AuditEvent, AuditEventType, AuditSink, Auditor, FileAuditSink, MemoryAuditSink};

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Returns false when a subscriber was already installed (tests, embedding).
pub fn init_tracing(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };

    result.is_ok()
}
