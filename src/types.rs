pub mod phase;

// Re-export types for convenience.
pub use crate::types::phase::SeismicPhase;

/// Index of a tomographic grid point, which is also a row/column of the covariance matrix.
pub type GridIndex = u32;

/// Identifier of a physical receiver (station).
pub type ReceiverId = i64;

/// Identifier of a seismic source.
pub type SourceId = i64;
