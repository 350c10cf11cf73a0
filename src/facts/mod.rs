//! # Facts
//!
//! Deterministic fact snapshots over mutable loan state, one engine per
//! domain (readiness, covenant, ESG KPI, portfolio), persisted
//! content-addressed with drift detection against the previous snapshot.

pub mod covenant;
pub mod errors;
pub mod esg;
pub mod portfolio;
pub mod readiness;
pub mod service;
pub mod snapshot;
pub mod store;

pub use errors::{FactError, FactResult};
pub use service::FactService;
pub use snapshot::{ComputeOutcome, EntityRef, FactDomain, FactSnapshot};
pub use store::{FactStore, MemoryFactStore};

/// Round half away from zero to a fixed number of decimals.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-0.15000000000000013, 4), -0.15);
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
