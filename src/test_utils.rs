use crate::contribution::{BlockEmitter, PartialContribution};
use crate::context::VarianceConfig;
use crate::geometry::{EarthPosition, ResolvedSource};
use crate::influence::InfluenceWeightMap;
use crate::models::{RayDefinition, RayIdentity};
use crate::types::{GridIndex, SeismicPhase};

/// Create a RayDefinition object with only required fields set (plus source weights).
pub(crate) fn get_test_ray_definition() -> RayDefinition {
    RayDefinition {
        model_name: "ak135".to_string(),
        phase: SeismicPhase::P,
        receiver_a: 1,
        receiver_b: None,
        source_id: 50,
        receiver_a_weights: InfluenceWeightMap::from([(10, 0.6), (11, 0.4)]),
        receiver_b_weights: None,
        source_weights: Some(InfluenceWeightMap::from([(50, 1.0)])),
        receiver_a_position: None,
        receiver_b_position: None,
        source_position: None,
    }
}

/// Create a receiver-pair RayDefinition object with all fields set.
pub(crate) fn get_test_ray_definition_pair() -> RayDefinition {
    RayDefinition {
        model_name: "ak135".to_string(),
        phase: SeismicPhase::P,
        receiver_a: 1,
        receiver_b: Some(2),
        source_id: 50,
        receiver_a_weights: InfluenceWeightMap::from([(10, 0.6), (11, 0.4)]),
        receiver_b_weights: Some(InfluenceWeightMap::from([(20, 0.7), (11, 0.3)])),
        source_weights: Some(InfluenceWeightMap::from([(50, 1.0)])),
        receiver_a_position: Some(EarthPosition::new(0.0, 0.0, 0.0)),
        receiver_b_position: Some(EarthPosition::new(0.0, 2.0, 0.0)),
        source_position: Some(EarthPosition::new(0.0, 1.0, 10.0)),
    }
}

/// Single receiver test ray identity (receiver 1, source 50).
pub(crate) fn aa_identity() -> RayIdentity {
    RayIdentity::single("ak135", SeismicPhase::P, 1, 50)
}

/// Receiver-pair test ray identity (receivers 1 and 2, source 50).
pub(crate) fn ab_identity() -> RayIdentity {
    RayIdentity::pair("ak135", SeismicPhase::P, 1, 2, 50)
}

/// Resolved source for the test identities.
pub(crate) fn resolved_source() -> ResolvedSource {
    ResolvedSource::new(50, EarthPosition::new(0.0, 1.0, 10.0))
}

/// Configuration with everything below `max_represented_column` represented.
pub(crate) fn config(max_represented_column: GridIndex) -> VarianceConfig {
    VarianceConfig {
        max_represented_column,
        strict_covariance: false,
    }
}

/// Contribution from task 1 on host "test" with unit ray weights.
pub(crate) fn contribution(row: GridIndex, col: GridIndex, covariance: f64) -> PartialContribution {
    weighted_contribution(row, col, 1.0, 1.0, covariance)
}

/// Contribution from task 1 on host "test".
pub(crate) fn weighted_contribution(
    row: GridIndex,
    col: GridIndex,
    row_weight: f64,
    col_weight: f64,
    covariance: f64,
) -> PartialContribution {
    BlockEmitter::new(1, "test", 0, 0).emit(row, col, row_weight, col_weight, covariance)
}

/// Assert two floats are equal to within a small tolerance.
pub(crate) fn assert_close(expected: f64, actual: f64) {
    assert!(
        (expected - actual).abs() < 1e-12,
        "expected {} but got {}",
        expected,
        actual
    );
}
