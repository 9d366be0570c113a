use crate::error::AggregationError;

use lazy_static::lazy_static;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Fragment counter
    pub static ref FRAGMENTS_LOADED: IntCounter = IntCounter::new(
        "fragments_loaded", "The number of partial result fragments merged into the index"
    ).unwrap();
    // Rejected redeliveries
    pub static ref DUPLICATE_DELIVERIES: IntCounter = IntCounter::new(
        "duplicate_deliveries", "The number of fragments rejected as already delivered"
    ).unwrap();
    // Contribution counter by merge kind
    pub static ref CONTRIBUTIONS_ACCUMULATED: IntCounterVec = IntCounterVec::new(
        Opts::new("contributions_accumulated", "The number of contributions accumulated into rays"),
        &["merge"]
    ).unwrap();
    // Finalized ray counter by ray type
    pub static ref RAYS_FINALIZED: IntCounterVec = IntCounterVec::new(
        Opts::new("rays_finalized", "The number of rays finalized"),
        &["ray_type"]
    ).unwrap();
    // Ray merge histogram
    pub static ref MERGE_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("merge_time", "The time taken to merge and finalize each ray"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &[],
    ).unwrap();
}

/// Register all metrics with [REGISTRY].
pub fn register_metrics() -> Result<(), AggregationError> {
    REGISTRY.register(Box::new(FRAGMENTS_LOADED.clone()))?;
    REGISTRY.register(Box::new(DUPLICATE_DELIVERIES.clone()))?;
    REGISTRY.register(Box::new(CONTRIBUTIONS_ACCUMULATED.clone()))?;
    REGISTRY.register(Box::new(RAYS_FINALIZED.clone()))?;
    REGISTRY.register(Box::new(MERGE_TIME.clone()))?;
    Ok(())
}

/// Render the registered metrics in the Prometheus text format.
pub fn render() -> Result<String, AggregationError> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    metrics_text(buffer)
}

fn metrics_text(buffer: Vec<u8>) -> Result<String, AggregationError> {
    String::from_utf8(buffer).map_err(|error| {
        AggregationError::Metrics(prometheus::Error::Msg(format!(
            "metrics are not UTF-8: {}",
            error
        )))
    })
}

/// Count contributions accumulated by a merge.
pub fn record_contributions(merge: &str, count: usize) {
    CONTRIBUTIONS_ACCUMULATED
        .with_label_values(&[merge])
        .inc_by(count as u64);
}

/// Count a finalized ray and observe how long it took.
pub fn record_ray(is_type_ab: bool, elapsed: std::time::Duration) {
    let ray_type = if is_type_ab { "ab" } else { "aa" };
    RAYS_FINALIZED.with_label_values(&[ray_type]).inc();
    MERGE_TIME
        .with_label_values(&[])
        .observe(elapsed.as_secs_f64());
}
