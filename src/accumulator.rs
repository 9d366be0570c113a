//! Per grid-point-pair accumulation of weighted covariance.

use crate::contribution::PartialContribution;
use crate::error::AggregationError;
use crate::types::GridIndex;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// One influence grid point of a ray endpoint and its interpolation weight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct InfluenceTerm {
    pub point: GridIndex,
    pub weight: f64,
}

impl InfluenceTerm {
    pub fn new(point: GridIndex, weight: f64) -> Self {
        InfluenceTerm { point, weight }
    }
}

/// The influence grid points through which a contribution reaches a ray.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Influence {
    pub receiver_a: InfluenceTerm,
    pub receiver_b: InfluenceTerm,
    pub source: InfluenceTerm,
}

impl Influence {
    /// True if both receiver legs terminate at the same influence grid point.
    pub fn shares_receiver(&self) -> bool {
        self.receiver_a.point == self.receiver_b.point
    }
}

/// Weight of a contribution reached through `influence`.
///
/// The product of the three influence weights and the two ray weights. When both receiver legs
/// share a grid point, an off-diagonal matrix entry stands for both (row, col) and (col, row)
/// traversals and is counted twice.
pub fn contribution_weight(contribution: &PartialContribution, influence: &Influence) -> f64 {
    let base = influence.receiver_a.weight
        * influence.receiver_b.weight
        * influence.source.weight
        * contribution.row_weight
        * contribution.col_weight;
    if influence.shares_receiver() && !contribution.is_diagonal() {
        2.0 * base
    } else {
        base
    }
}

/// One accumulated contribution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubEntry {
    /// Influence grid points and weights
    pub influence: Influence,
    /// Ray weight of the row grid point
    pub row_weight: f64,
    /// Ray weight of the column grid point
    pub col_weight: f64,
    /// Combined weight
    pub weight: f64,
}

/// Variance category of a grid point pair.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VarianceCategory {
    Diagonal,
    OffDiagonal,
    NonRepresented,
}

impl VarianceCategory {
    /// Classify a grid point pair.
    ///
    /// A pair touching a grid point at or beyond `max_represented_column` is non-represented,
    /// whichever of its two indices that is.
    pub fn classify(p1: GridIndex, p2: GridIndex, max_represented_column: GridIndex) -> Self {
        if p1 >= max_represented_column || p2 >= max_represented_column {
            VarianceCategory::NonRepresented
        } else if p1 == p2 {
            VarianceCategory::Diagonal
        } else {
            VarianceCategory::OffDiagonal
        }
    }
}

/// Accumulates every contribution of one grid point pair to one ray.
#[derive(Clone, Debug, PartialEq)]
pub struct RayEntryAccumulator {
    p1: GridIndex,
    p2: GridIndex,
    covariance: f64,
    entries: Vec<SubEntry>,
    total_weight: f64,
}

impl RayEntryAccumulator {
    /// Return an empty accumulator for pair (`p1`, `p2`).
    pub fn new(p1: GridIndex, p2: GridIndex, covariance: f64) -> Self {
        RayEntryAccumulator {
            p1,
            p2,
            covariance,
            entries: Vec::new(),
            total_weight: 0.0,
        }
    }

    /// Record a contribution, returning the weight it adds.
    pub fn accumulate(&mut self, contribution: &PartialContribution, influence: &Influence) -> f64 {
        let weight = contribution_weight(contribution, influence);
        self.entries.push(SubEntry {
            influence: *influence,
            row_weight: contribution.row_weight,
            col_weight: contribution.col_weight,
            weight,
        });
        weight
    }

    /// Sum the sub-entry weights and order sub-entries by descending absolute weight.
    pub fn finalize(&mut self) {
        self.total_weight = self.entries.iter().map(|entry| entry.weight).sum();
        self.entries
            .sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
    }

    pub fn points(&self) -> (GridIndex, GridIndex) {
        (self.p1, self.p2)
    }

    pub fn covariance(&self) -> f64 {
        self.covariance
    }

    pub fn entries(&self) -> &[SubEntry] {
        &self.entries
    }

    /// Sum of sub-entry weights as of the last [finalize](Self::finalize).
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn weighted_covariance(&self) -> f64 {
        self.total_weight * self.covariance
    }

    pub fn is_diagonal(&self) -> bool {
        self.p1 == self.p2
    }

    pub fn is_non_represented(&self, max_represented_column: GridIndex) -> bool {
        self.category(max_represented_column) == VarianceCategory::NonRepresented
    }

    pub fn category(&self, max_represented_column: GridIndex) -> VarianceCategory {
        VarianceCategory::classify(self.p1, self.p2, max_represented_column)
    }
}

/// The accumulators of one ray, in creation order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccumulatorSet {
    entries: Vec<RayEntryAccumulator>,
    slots: HashMap<(GridIndex, GridIndex), usize>,
}

impl AccumulatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contribution to the accumulator of its grid point pair.
    ///
    /// An accumulator keyed (col, row) is preferred over one keyed (row, col); if neither
    /// exists, one is created under (row, col) carrying this contribution's covariance. With
    /// `strict_covariance` a contribution disagreeing with the stored covariance is rejected.
    pub fn accumulate(
        &mut self,
        contribution: &PartialContribution,
        influence: &Influence,
        strict_covariance: bool,
    ) -> Result<f64, AggregationError> {
        let row = contribution.row_grid_index;
        let col = contribution.col_grid_index;
        let slot = match self
            .slots
            .get(&(col, row))
            .or_else(|| self.slots.get(&(row, col)))
            .copied()
        {
            Some(slot) => slot,
            None => {
                let slot = self.entries.len();
                self.entries
                    .push(RayEntryAccumulator::new(row, col, contribution.covariance));
                self.slots.insert((row, col), slot);
                slot
            }
        };
        let accumulator = &mut self.entries[slot];
        if strict_covariance && accumulator.covariance != contribution.covariance {
            return Err(AggregationError::CovarianceMismatch {
                row: accumulator.p1,
                col: accumulator.p2,
                stored: accumulator.covariance,
                received: contribution.covariance,
            });
        }
        Ok(accumulator.accumulate(contribution, influence))
    }

    /// Accumulator stored under exactly (`p1`, `p2`).
    pub fn get(&self, p1: GridIndex, p2: GridIndex) -> Option<&RayEntryAccumulator> {
        self.slots.get(&(p1, p2)).map(|slot| &self.entries[*slot])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RayEntryAccumulator> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, RayEntryAccumulator> {
        self.entries.iter_mut()
    }

    /// Accumulators by position, as handed out by [AccumulatorSet::iter].
    pub fn as_slice(&self) -> &[RayEntryAccumulator] {
        &self.entries
    }
}
