//! This crate decomposes the travel-time variance of seismic rays. Block covariance tasks,
//! running in parallel across a cluster, each report the covariance matrix entries that touch
//! a set of rays. This crate merges those partial results, weights every entry by the
//! interpolation weights of each ray's receiver and source influence grid points, and splits
//! each ray's variance into diagonal, off-diagonal and non-represented parts.
//!
//! The main types are:
//!
//! * [PartialResultIndex](index::PartialResultIndex), the composite-keyed store of partial
//!   contributions, which can be [serialised](codec) for transport between processes.
//! * [RayEntryAccumulator](accumulator::RayEntryAccumulator), accumulating the contributions of
//!   one grid point pair to one ray.
//! * [RayAggregator](aggregator::RayAggregator), pulling a ray's contributions out of the index
//!   and decomposing its variance.
//! * [RayCatalog](catalog::RayCatalog), the registry of all rays of a run.
//!
//! The [driver] runs a complete aggregation from ray definitions and fragment files. It is
//! built on a number of open source components.
//!
//! * [Serde](serde) performs (de)serialisation of JSON ray definitions and reports.
//! * [Rayon](rayon) loads fragments and processes rays in parallel.
//! * [flate2] (de)compresses fragment files.
//! * [Prometheus](prometheus) and the tracing crate provide metrics and logging.

pub mod accumulator;
pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod codec;
pub mod compression;
pub mod context;
pub mod contribution;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod index;
pub mod influence;
pub mod metrics;
pub mod models;
pub mod report;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
