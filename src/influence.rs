//! Influence weight maps.
//!
//! An influence weight map holds the grid points of a ray endpoint's interpolation stencil and
//! their interpolation weights. The maps are produced by the ray tracing stage and consumed here
//! without modification.

use crate::types::GridIndex;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse map of grid point index to interpolation weight.
///
/// Iteration is in ascending grid index order so that merges accumulate contributions in a
/// reproducible order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InfluenceWeightMap(BTreeMap<GridIndex, f64>);

impl InfluenceWeightMap {
    /// Return an empty InfluenceWeightMap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight of a grid point, returning any previous weight.
    pub fn insert(&mut self, point: GridIndex, weight: f64) -> Option<f64> {
        self.0.insert(point, weight)
    }

    /// Weight of a grid point, if it belongs to the stencil.
    pub fn get(&self, point: GridIndex) -> Option<f64> {
        self.0.get(&point).copied()
    }

    /// Iterate over (grid point, weight) pairs in ascending grid point order.
    pub fn iter(&self) -> impl Iterator<Item = (GridIndex, f64)> + '_ {
        self.0.iter().map(|(point, weight)| (*point, *weight))
    }

    /// Number of grid points in the stencil.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the stencil is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// True if every weight is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.values().all(|weight| weight.is_finite())
    }
}

impl FromIterator<(GridIndex, f64)> for InfluenceWeightMap {
    fn from_iter<I: IntoIterator<Item = (GridIndex, f64)>>(iter: I) -> Self {
        InfluenceWeightMap(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(GridIndex, f64); N]> for InfluenceWeightMap {
    fn from(entries: [(GridIndex, f64); N]) -> Self {
        entries.into_iter().collect()
    }
}
