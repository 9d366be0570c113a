//! Partial covariance contributions emitted by block covariance tasks.

use crate::types::GridIndex;

use serde::{Deserialize, Serialize};

/// One covariance matrix entry touching a ray, as reported by one block task.
///
/// Immutable once emitted. Within a bucket of the
/// [PartialResultIndex](crate::index::PartialResultIndex) a contribution is identified by its
/// (row, column) grid index pair.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PartialContribution {
    /// Covariance matrix row (grid point) index
    pub row_grid_index: GridIndex,
    /// Covariance matrix column (grid point) index
    pub col_grid_index: GridIndex,
    /// Ray interpolation weight of the row grid point as seen by the emitting task
    pub row_weight: f64,
    /// Ray interpolation weight of the column grid point as seen by the emitting task
    pub col_weight: f64,
    /// Covariance of the matrix entry
    pub covariance: f64,
    /// Id of the task that emitted this contribution
    pub origin_task_id: u32,
    /// Host on which the task ran
    pub origin_host: String,
    /// Matrix index of the first row of the block
    pub block_row_origin: GridIndex,
    /// Matrix index of the first column of the block
    pub block_col_origin: GridIndex,
    /// Emission counter within the task
    pub sequence_counter: u32,
}

impl PartialContribution {
    /// True if the contribution lies on the covariance matrix diagonal.
    pub fn is_diagonal(&self) -> bool {
        self.row_grid_index == self.col_grid_index
    }
}

/// Stamps contributions emitted by one block task with the task's origin.
///
/// The sequence counter increases by one for every emitted contribution.
#[derive(Clone, Debug)]
pub struct BlockEmitter {
    task_id: u32,
    host: String,
    block_row_origin: GridIndex,
    block_col_origin: GridIndex,
    counter: u32,
}

impl BlockEmitter {
    /// Return a new BlockEmitter for a task processing the block starting at
    /// (`block_row_origin`, `block_col_origin`).
    pub fn new(
        task_id: u32,
        host: impl Into<String>,
        block_row_origin: GridIndex,
        block_col_origin: GridIndex,
    ) -> Self {
        BlockEmitter {
            task_id,
            host: host.into(),
            block_row_origin,
            block_col_origin,
            counter: 0,
        }
    }

    /// Emit the next contribution.
    pub fn emit(
        &mut self,
        row_grid_index: GridIndex,
        col_grid_index: GridIndex,
        row_weight: f64,
        col_weight: f64,
        covariance: f64,
    ) -> PartialContribution {
        let contribution = PartialContribution {
            row_grid_index,
            col_grid_index,
            row_weight,
            col_weight,
            covariance,
            origin_task_id: self.task_id,
            origin_host: self.host.clone(),
            block_row_origin: self.block_row_origin,
            block_col_origin: self.block_col_origin,
            sequence_counter: self.counter,
        };
        self.counter += 1;
        contribution
    }

    /// Number of contributions emitted so far.
    pub fn emitted(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_stamps_origin_and_sequence() {
        let mut emitter = BlockEmitter::new(7, "node-3", 100, 200);
        let first = emitter.emit(101, 205, 0.5, 0.25, 3.0);
        let second = emitter.emit(102, 202, 1.0, 1.0, -1.0);
        assert_eq!(7, first.origin_task_id);
        assert_eq!("node-3", first.origin_host);
        assert_eq!(100, first.block_row_origin);
        assert_eq!(200, first.block_col_origin);
        assert_eq!(0, first.sequence_counter);
        assert_eq!(1, second.sequence_counter);
        assert_eq!(2, emitter.emitted());
        assert_eq!(-1.0, second.covariance);
    }

    #[test]
    fn test_diagonal() {
        let mut emitter = BlockEmitter::new(1, "h", 0, 0);
        assert!(emitter.emit(4, 4, 1.0, 1.0, 1.0).is_diagonal());
        assert!(!emitter.emit(4, 5, 1.0, 1.0, 1.0).is_diagonal());
    }
}
