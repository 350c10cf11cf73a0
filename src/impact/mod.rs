//! # Impact Propagation
//!
//! Maps document and amendment mutations to downstream fact recompute.

pub mod errors;
pub mod event;
pub mod propagator;

pub use errors::{ImpactError, ImpactResult};
pub use event::{
    detect_targets, ImpactEvent, ImpactSource, ImpactStore, ImpactTarget, MemoryImpactStore, SourceAction, SourceType,
};
pub use propagator::ImpactPropagator;
