//! Variance decomposition of a single ray.
//!
//! A [RayAggregator] pulls the contributions relevant to its ray out of a
//! [PartialResultIndex], weighting each one by the interpolation weights of the ray's influence
//! grid points. After [finalize](RayAggregator::finalize) the ray's variance is split into
//! diagonal, off-diagonal and non-represented parts.

use crate::accumulator::{
    AccumulatorSet, Influence, InfluenceTerm, RayEntryAccumulator, VarianceCategory,
};
use crate::context::VarianceConfig;
use crate::contribution::PartialContribution;
use crate::error::AggregationError;
use crate::geometry::{EarthPosition, ResolvedSource};
use crate::index::PartialResultIndex;
use crate::influence::InfluenceWeightMap;
use crate::metrics;
use crate::models::RayIdentity;

/// Aggregates the covariance contributions of one ray.
#[derive(Clone, Debug)]
pub struct RayAggregator {
    identity: RayIdentity,
    config: VarianceConfig,

    receiver_a_weights: Option<InfluenceWeightMap>,
    receiver_b_weights: Option<InfluenceWeightMap>,
    source_weights: Option<InfluenceWeightMap>,

    receiver_a_position: Option<EarthPosition>,
    receiver_b_position: Option<EarthPosition>,
    source: Option<ResolvedSource>,

    accumulators: AccumulatorSet,

    diagonal_variance: f64,
    off_diagonal_variance: f64,
    non_represented_variance: f64,
    diagonal: Vec<usize>,
    off_diagonal: Vec<usize>,
    non_represented: Vec<usize>,
    finalized: bool,
}

impl RayAggregator {
    /// Return a new, empty RayAggregator.
    pub fn new(identity: RayIdentity, config: VarianceConfig) -> Self {
        RayAggregator {
            identity,
            config,
            receiver_a_weights: None,
            receiver_b_weights: None,
            source_weights: None,
            receiver_a_position: None,
            receiver_b_position: None,
            source: None,
            accumulators: AccumulatorSet::new(),
            diagonal_variance: 0.0,
            off_diagonal_variance: 0.0,
            non_represented_variance: 0.0,
            diagonal: Vec::new(),
            off_diagonal: Vec::new(),
            non_represented: Vec::new(),
            finalized: false,
        }
    }

    pub fn identity(&self) -> &RayIdentity {
        &self.identity
    }

    pub fn config(&self) -> &VarianceConfig {
        &self.config
    }

    /// Set the influence weight maps of the ray endpoints.
    ///
    /// The maps are copied; later changes to the caller's maps do not affect the ray.
    pub fn set_influence_weights(
        &mut self,
        receiver_a: &InfluenceWeightMap,
        receiver_b: Option<&InfluenceWeightMap>,
        source: &InfluenceWeightMap,
    ) {
        self.set_receiver_weights(receiver_a, receiver_b);
        self.set_source_weights(source);
    }

    /// Set the influence weight maps of the receivers only.
    pub fn set_receiver_weights(
        &mut self,
        receiver_a: &InfluenceWeightMap,
        receiver_b: Option<&InfluenceWeightMap>,
    ) {
        self.receiver_a_weights = Some(receiver_a.clone());
        self.receiver_b_weights = receiver_b.cloned();
    }

    /// Set the influence weight map of the source only.
    pub fn set_source_weights(&mut self, source: &InfluenceWeightMap) {
        self.source_weights = Some(source.clone());
    }

    /// Set the receiver positions, used for the source to receiver distance.
    pub fn set_receiver_positions(
        &mut self,
        receiver_a: Option<EarthPosition>,
        receiver_b: Option<EarthPosition>,
    ) {
        self.receiver_a_position = receiver_a;
        self.receiver_b_position = receiver_b;
    }

    /// Resolve the ray's source.
    ///
    /// Fails if the source id differs from the ray's.
    pub fn resolve_source(&mut self, source: ResolvedSource) -> Result<(), AggregationError> {
        if source.id != self.identity.source_id {
            return Err(AggregationError::SourceMismatch {
                ray: self.identity.to_string(),
                received: source.id,
            });
        }
        self.source = Some(source);
        Ok(())
    }

    pub fn is_source_resolved(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&ResolvedSource> {
        self.source.as_ref()
    }

    /// Distance in km between the resolved source and the receiver.
    ///
    /// For receiver-pair rays this is the mean distance to the two receivers. `None` until the
    /// source and receiver positions are known.
    pub fn source_receiver_distance_km(&self) -> Option<f64> {
        let source = self.source.as_ref()?.position;
        let receiver_a = self.receiver_a_position?;
        let distance_a = source.distance_km(&receiver_a);
        if self.identity.is_type_ab() {
            let receiver_b = self.receiver_b_position?;
            Some(0.5 * (distance_a + source.distance_km(&receiver_b)))
        } else {
            Some(distance_a)
        }
    }

    fn weights<'a>(
        &self,
        weights: &'a Option<InfluenceWeightMap>,
        endpoint: &'static str,
    ) -> Result<&'a InfluenceWeightMap, AggregationError> {
        weights
            .as_ref()
            .ok_or_else(|| AggregationError::InfluenceWeightsUnset {
                ray: self.identity.to_string(),
                endpoint,
            })
    }

    fn check_source_resolved(&self) -> Result<(), AggregationError> {
        if self.source.is_none() {
            return Err(AggregationError::SourceUnresolved {
                ray: self.identity.to_string(),
            });
        }
        Ok(())
    }

    /// Influence combinations read by [merge_single_receiver](Self::merge_single_receiver).
    ///
    /// For single receiver rays the receiver weight enters once (the receiver B term has weight
    /// 1). For receiver-pair rays only receiver A grid points also in receiver B's stencil take
    /// part, weighted by both receivers.
    pub fn single_receiver_plan(&self) -> Result<Vec<Influence>, AggregationError> {
        let receiver_a = self.weights(&self.receiver_a_weights, "receiver A")?;
        let receiver_b = if self.identity.is_type_ab() {
            self.check_source_resolved()?;
            Some(self.weights(&self.receiver_b_weights, "receiver B")?)
        } else {
            None
        };
        let source = self.weights(&self.source_weights, "source")?;

        let mut plan = Vec::new();
        for (point, weight_a) in receiver_a.iter() {
            let weight_b = match receiver_b {
                Some(receiver_b) => match receiver_b.get(point) {
                    Some(weight_b) => weight_b,
                    None => continue,
                },
                None => 1.0,
            };
            for (source_point, source_weight) in source.iter() {
                plan.push(Influence {
                    receiver_a: InfluenceTerm::new(point, weight_a),
                    receiver_b: InfluenceTerm::new(point, weight_b),
                    source: InfluenceTerm::new(source_point, source_weight),
                });
            }
        }
        Ok(plan)
    }

    /// Influence combinations read by [merge_receiver_pair](Self::merge_receiver_pair).
    ///
    /// Empty for single receiver rays.
    pub fn receiver_pair_plan(&self) -> Result<Vec<Influence>, AggregationError> {
        if !self.identity.is_type_ab() {
            return Ok(Vec::new());
        }
        self.check_source_resolved()?;
        let receiver_a = self.weights(&self.receiver_a_weights, "receiver A")?;
        let receiver_b = self.weights(&self.receiver_b_weights, "receiver B")?;
        let source = self.weights(&self.source_weights, "source")?;

        let mut plan =
            Vec::with_capacity(receiver_a.len() * receiver_b.len() * source.len());
        for (point_a, weight_a) in receiver_a.iter() {
            for (point_b, weight_b) in receiver_b.iter() {
                for (source_point, source_weight) in source.iter() {
                    plan.push(Influence {
                        receiver_a: InfluenceTerm::new(point_a, weight_a),
                        receiver_b: InfluenceTerm::new(point_b, weight_b),
                        source: InfluenceTerm::new(source_point, source_weight),
                    });
                }
            }
        }
        Ok(plan)
    }

    /// Merge single receiver contributions from `index`.
    ///
    /// Returns the number of contributions accumulated.
    pub fn merge_single_receiver(
        &mut self,
        index: &PartialResultIndex,
    ) -> Result<usize, AggregationError> {
        let phase = self.identity.phase;
        let mut count = 0;
        for influence in self.single_receiver_plan()? {
            let bucket = index
                .lookup_single(phase, influence.receiver_a.point)
                .and_then(|sources| sources.get(influence.source.point));
            count += self.accumulate_bucket(bucket, &influence)?;
        }
        metrics::record_contributions("single", count);
        Ok(count)
    }

    /// Merge receiver-pair contributions from `index`.
    ///
    /// Does nothing for single receiver rays. Returns the number of contributions accumulated.
    pub fn merge_receiver_pair(
        &mut self,
        index: &PartialResultIndex,
    ) -> Result<usize, AggregationError> {
        let phase = self.identity.phase;
        let mut count = 0;
        for influence in self.receiver_pair_plan()? {
            let bucket = index
                .lookup_pair(phase, influence.receiver_a.point, influence.receiver_b.point)
                .and_then(|sources| sources.get(influence.source.point));
            count += self.accumulate_bucket(bucket, &influence)?;
        }
        metrics::record_contributions("pair", count);
        Ok(count)
    }

    fn accumulate_bucket(
        &mut self,
        bucket: Option<&[PartialContribution]>,
        influence: &Influence,
    ) -> Result<usize, AggregationError> {
        let Some(bucket) = bucket else {
            return Ok(0);
        };
        self.finalized = false;
        for contribution in bucket {
            self.accumulators
                .accumulate(contribution, influence, self.config.strict_covariance)?;
        }
        Ok(bucket.len())
    }

    /// Finalize every accumulator and decompose the ray's variance.
    ///
    /// May be called again after further merges.
    pub fn finalize(&mut self) {
        let max = self.config.max_represented_column;
        self.diagonal.clear();
        self.off_diagonal.clear();
        self.non_represented.clear();
        self.diagonal_variance = 0.0;
        self.off_diagonal_variance = 0.0;
        self.non_represented_variance = 0.0;

        for (slot, accumulator) in self.accumulators.iter_mut().enumerate() {
            accumulator.finalize();
            let weighted = accumulator.weighted_covariance();
            match accumulator.category(max) {
                VarianceCategory::Diagonal => {
                    self.diagonal.push(slot);
                    self.diagonal_variance += weighted;
                }
                VarianceCategory::OffDiagonal => {
                    self.off_diagonal.push(slot);
                    self.off_diagonal_variance += weighted;
                }
                VarianceCategory::NonRepresented => {
                    self.non_represented.push(slot);
                    self.non_represented_variance += weighted;
                }
            }
        }

        let accumulators = self.accumulators.as_slice();
        for slots in [
            &mut self.diagonal,
            &mut self.off_diagonal,
            &mut self.non_represented,
        ] {
            slots.sort_by(|a, b| {
                let a = accumulators[*a].weighted_covariance().abs();
                let b = accumulators[*b].weighted_covariance().abs();
                b.total_cmp(&a)
            });
        }
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn diagonal_variance(&self) -> f64 {
        self.diagonal_variance
    }

    pub fn off_diagonal_variance(&self) -> f64 {
        self.off_diagonal_variance
    }

    pub fn non_represented_variance(&self) -> f64 {
        self.non_represented_variance
    }

    /// Sum of the three variance categories.
    pub fn total_variance(&self) -> f64 {
        self.diagonal_variance + self.off_diagonal_variance + self.non_represented_variance
    }

    /// Fraction of the total variance carried by represented grid points.
    ///
    /// `None` when the total variance is zero.
    pub fn represented_fraction(&self) -> Option<f64> {
        let total = self.total_variance();
        if total == 0.0 {
            None
        } else {
            Some((self.diagonal_variance + self.off_diagonal_variance) / total)
        }
    }

    /// All accumulators, in creation order.
    pub fn accumulators(&self) -> &AccumulatorSet {
        &self.accumulators
    }

    /// Accumulators of one category, by descending absolute weighted covariance.
    pub fn category(
        &self,
        category: VarianceCategory,
    ) -> impl Iterator<Item = &RayEntryAccumulator> + '_ {
        let slots = match category {
            VarianceCategory::Diagonal => &self.diagonal,
            VarianceCategory::OffDiagonal => &self.off_diagonal,
            VarianceCategory::NonRepresented => &self.non_represented,
        };
        let accumulators = self.accumulators.as_slice();
        slots.iter().map(move |slot| &accumulators[*slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::BlockEmitter;
    use crate::test_utils::{self, assert_close};
    use crate::types::SeismicPhase;

    fn aa_ray(max: u32, receiver: InfluenceWeightMap) -> RayAggregator {
        let mut ray = RayAggregator::new(test_utils::aa_identity(), test_utils::config(max));
        ray.set_influence_weights(&receiver, None, &InfluenceWeightMap::from([(50, 1.0)]));
        ray
    }

    fn ab_ray(max: u32) -> RayAggregator {
        let mut ray = RayAggregator::new(test_utils::ab_identity(), test_utils::config(max));
        ray.set_influence_weights(
            &InfluenceWeightMap::from([(1, 1.0)]),
            Some(&InfluenceWeightMap::from([(2, 1.0)])),
            &InfluenceWeightMap::from([(50, 1.0)]),
        );
        ray.resolve_source(test_utils::resolved_source()).unwrap();
        ray
    }

    fn check_partition(ray: &RayAggregator) {
        let sum: f64 = ray
            .accumulators()
            .iter()
            .map(RayEntryAccumulator::weighted_covariance)
            .sum();
        assert!((ray.total_variance() - sum).abs() < 1e-9);
    }

    #[test]
    fn test_two_diagonal_contributions() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(10, 10, 2.0));
        index.put_single(SeismicPhase::P, 11, 50, test_utils::contribution(11, 11, 3.0));
        let mut ray = aa_ray(100, InfluenceWeightMap::from([(10, 0.6), (11, 0.4)]));
        assert_eq!(2, ray.merge_single_receiver(&index).unwrap());
        ray.finalize();

        let diagonal: Vec<&RayEntryAccumulator> =
            ray.category(VarianceCategory::Diagonal).collect();
        assert_eq!(2, diagonal.len());
        let first = ray.accumulators().get(10, 10).unwrap();
        assert_close(0.6, first.total_weight());
        assert_close(1.2, first.weighted_covariance());
        let second = ray.accumulators().get(11, 11).unwrap();
        assert_close(0.4, second.total_weight());
        assert_close(1.2, second.weighted_covariance());
        assert_close(2.4, ray.diagonal_variance());
        assert_eq!(0.0, ray.off_diagonal_variance());
        assert_eq!(0.0, ray.non_represented_variance());
        assert_eq!(Some(1.0), ray.represented_fraction());
        check_partition(&ray);
    }

    #[test]
    fn test_single_receiver_off_diagonal_doubles() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(10, 20, 1.0));
        let mut ray = aa_ray(100, InfluenceWeightMap::from([(10, 0.5)]));
        ray.merge_single_receiver(&index).unwrap();
        ray.finalize();
        let accumulator = ray.accumulators().get(10, 20).unwrap();
        assert_close(1.0, accumulator.total_weight());
        assert_close(1.0, accumulator.weighted_covariance());
        assert_close(1.0, ray.off_diagonal_variance());
        assert_eq!(1, ray.category(VarianceCategory::OffDiagonal).count());
    }

    #[test]
    fn test_non_represented_regardless_of_diagonal() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(20, 20, 1.0));
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(3, 20, 1.0));
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(3, 3, 1.0));
        let mut ray = aa_ray(15, InfluenceWeightMap::from([(10, 1.0)]));
        ray.merge_single_receiver(&index).unwrap();
        ray.finalize();
        assert_eq!(2, ray.category(VarianceCategory::NonRepresented).count());
        assert_eq!(1, ray.category(VarianceCategory::Diagonal).count());
        assert_close(3.0, ray.non_represented_variance());
        assert_close(1.0, ray.diagonal_variance());
        assert_close(0.25, ray.represented_fraction().unwrap());
        check_partition(&ray);
    }

    #[test]
    fn test_receiver_pair_merge_ignores_single_receiver_index() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 1, 50, test_utils::contribution(1, 1, 5.0));
        let mut ray = ab_ray(100);
        assert_eq!(0, ray.merge_receiver_pair(&index).unwrap());
        ray.finalize();
        assert!(ray.accumulators().is_empty());
        assert_eq!(0.0, ray.total_variance());
        assert_eq!(None, ray.represented_fraction());

        index.put_pair(SeismicPhase::P, 1, 2, 50, test_utils::contribution(1, 2, 5.0));
        assert_eq!(1, ray.merge_receiver_pair(&index).unwrap());
        ray.finalize();
        // Distinct receiver grid points never double.
        assert_close(5.0, ray.off_diagonal_variance());
    }

    #[test]
    fn test_receiver_pair_single_receiver_half_needs_shared_point() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(10, 10, 1.0));
        index.put_single(SeismicPhase::P, 11, 50, test_utils::contribution(11, 12, 1.0));
        let mut ray = RayAggregator::new(test_utils::ab_identity(), test_utils::config(100));
        let definition = test_utils::get_test_ray_definition_pair();
        ray.set_influence_weights(
            &definition.receiver_a_weights,
            definition.receiver_b_weights.as_ref(),
            &InfluenceWeightMap::from([(50, 1.0)]),
        );
        ray.resolve_source(test_utils::resolved_source()).unwrap();
        assert_eq!(1, ray.merge_single_receiver(&index).unwrap());
        ray.finalize();
        // 0.4 * 0.3, doubled off the diagonal
        let accumulator = ray.accumulators().get(11, 12).unwrap();
        assert_close(0.24, accumulator.total_weight());
        assert!(ray.accumulators().get(10, 10).is_none());
    }

    #[test]
    fn test_single_receiver_merge_is_noop_for_pair_plan() {
        let ray = aa_ray(100, InfluenceWeightMap::from([(10, 1.0)]));
        assert!(ray.receiver_pair_plan().unwrap().is_empty());
        let mut ray = ray;
        assert_eq!(0, ray.merge_receiver_pair(&PartialResultIndex::new()).unwrap());
    }

    #[test]
    fn test_receiver_pair_merge_requires_resolved_source() {
        let mut ray = RayAggregator::new(test_utils::ab_identity(), test_utils::config(100));
        ray.set_influence_weights(
            &InfluenceWeightMap::from([(1, 1.0)]),
            Some(&InfluenceWeightMap::from([(2, 1.0)])),
            &InfluenceWeightMap::from([(50, 1.0)]),
        );
        let index = PartialResultIndex::new();
        for result in [
            ray.merge_receiver_pair(&index),
            ray.merge_single_receiver(&index),
        ] {
            match result.unwrap_err() {
                AggregationError::SourceUnresolved { ray } => assert_eq!("ak135/P/1-2/50", ray),
                err => panic!("unexpected error {}", err),
            }
        }
    }

    #[test]
    fn test_merge_requires_influence_weights() {
        let mut ray = RayAggregator::new(test_utils::aa_identity(), test_utils::config(100));
        match ray
            .merge_single_receiver(&PartialResultIndex::new())
            .unwrap_err()
        {
            AggregationError::InfluenceWeightsUnset { endpoint, .. } => {
                assert_eq!("receiver A", endpoint)
            }
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn test_resolve_source_rejects_other_source() {
        let mut ray = RayAggregator::new(test_utils::aa_identity(), test_utils::config(100));
        let source = ResolvedSource::new(51, EarthPosition::new(0.0, 0.0, 0.0));
        match ray.resolve_source(source).unwrap_err() {
            AggregationError::SourceMismatch { received, .. } => assert_eq!(51, received),
            err => panic!("unexpected error {}", err),
        }
        assert!(!ray.is_source_resolved());
    }

    #[test]
    fn test_source_receiver_distance() {
        let mut ray = RayAggregator::new(test_utils::ab_identity(), test_utils::config(100));
        assert_eq!(None, ray.source_receiver_distance_km());
        let definition = test_utils::get_test_ray_definition_pair();
        ray.set_receiver_positions(
            definition.receiver_a_position,
            definition.receiver_b_position,
        );
        ray.resolve_source(definition.resolved_source().unwrap())
            .unwrap();
        // Receivers sit symmetrically either side of the source.
        let source = definition.source_position.unwrap();
        let expected = source.distance_km(&definition.receiver_a_position.unwrap());
        let distance = ray.source_receiver_distance_km().unwrap();
        assert!((expected - distance).abs() < 1e-9);
    }

    #[test]
    fn test_categories_sort_by_weighted_covariance() {
        let mut index = PartialResultIndex::new();
        let mut emitter = BlockEmitter::new(1, "a", 0, 0);
        index.put_single(SeismicPhase::P, 10, 50, emitter.emit(1, 1, 1.0, 1.0, 1.0));
        index.put_single(SeismicPhase::P, 10, 50, emitter.emit(2, 2, 1.0, 1.0, -3.0));
        index.put_single(SeismicPhase::P, 10, 50, emitter.emit(3, 3, 1.0, 1.0, 2.0));
        index.put_single(SeismicPhase::P, 10, 50, emitter.emit(4, 4, 1.0, 1.0, 1.0));
        let mut ray = aa_ray(100, InfluenceWeightMap::from([(10, 1.0)]));
        ray.merge_single_receiver(&index).unwrap();
        ray.finalize();
        let order: Vec<(u32, u32)> = ray
            .category(VarianceCategory::Diagonal)
            .map(RayEntryAccumulator::points)
            .collect();
        assert_eq!(vec![(2, 2), (3, 3), (1, 1), (4, 4)], order);
        assert_close(1.0, ray.diagonal_variance());
    }

    #[test]
    fn test_strict_mode_fails_the_merge() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(1, 2, 1.0));
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(2, 1, 1.5));
        let mut lenient = aa_ray(100, InfluenceWeightMap::from([(10, 1.0)]));
        lenient.merge_single_receiver(&index).unwrap();
        lenient.finalize();
        // The first covariance seen wins.
        assert_eq!(1.0, lenient.accumulators().get(1, 2).unwrap().covariance());
        assert_close(4.0, lenient.off_diagonal_variance());

        let mut strict = RayAggregator::new(
            test_utils::aa_identity(),
            VarianceConfig {
                max_represented_column: 100,
                strict_covariance: true,
            },
        );
        strict.set_influence_weights(
            &InfluenceWeightMap::from([(10, 1.0)]),
            None,
            &InfluenceWeightMap::from([(50, 1.0)]),
        );
        let error = strict.merge_single_receiver(&index).unwrap_err();
        assert!(matches!(error, AggregationError::CovarianceMismatch { .. }));
    }

    #[test]
    fn test_failed_merge_clears_finalized() {
        let config = VarianceConfig {
            max_represented_column: 100,
            strict_covariance: true,
        };
        let mut ray = RayAggregator::new(test_utils::aa_identity(), config);
        ray.set_influence_weights(
            &InfluenceWeightMap::from([(10, 1.0)]),
            None,
            &InfluenceWeightMap::from([(50, 1.0)]),
        );
        let mut first = PartialResultIndex::new();
        first.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(1, 2, 1.0));
        ray.merge_single_receiver(&first).unwrap();
        ray.finalize();
        assert!(ray.is_finalized());

        // The first contribution of the bucket lands before the mismatch is found.
        let mut second = PartialResultIndex::new();
        second.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(3, 3, 1.0));
        second.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(2, 1, 1.5));
        let error = ray.merge_single_receiver(&second).unwrap_err();
        assert!(matches!(error, AggregationError::CovarianceMismatch { .. }));
        assert!(!ray.is_finalized());
        assert!(ray.accumulators().get(3, 3).is_some());
    }

    #[test]
    fn test_merging_twice_doubles() {
        let mut index = PartialResultIndex::new();
        index.put_single(SeismicPhase::P, 10, 50, test_utils::contribution(10, 10, 2.0));
        let mut ray = aa_ray(100, InfluenceWeightMap::from([(10, 0.5)]));
        ray.merge_single_receiver(&index).unwrap();
        ray.finalize();
        assert_close(1.0, ray.diagonal_variance());
        ray.merge_single_receiver(&index).unwrap();
        assert!(!ray.is_finalized());
        ray.finalize();
        assert_close(2.0, ray.diagonal_variance());
        check_partition(&ray);
    }

    #[test]
    fn test_caller_maps_are_copied() {
        let mut receiver = InfluenceWeightMap::from([(10, 0.5)]);
        let mut ray = aa_ray(100, receiver.clone());
        ray.set_influence_weights(&receiver, None, &InfluenceWeightMap::from([(50, 1.0)]));
        receiver.insert(10, 0.9);
        let plan = ray.single_receiver_plan().unwrap();
        assert_eq!(1, plan.len());
        assert_eq!(0.5, plan[0].receiver_a.weight);
        assert_eq!(1.0, plan[0].receiver_b.weight);
    }
}
