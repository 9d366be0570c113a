//! Run and ray reports.

use crate::accumulator::{RayEntryAccumulator, SubEntry, VarianceCategory};
use crate::aggregator::RayAggregator;
use crate::error::{AggregationError, ErrorReport};
use crate::models::RayIdentity;
use crate::types::GridIndex;

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Summary of one grid point pair of a ray.
#[derive(Debug, PartialEq, Serialize)]
pub struct EntrySummary {
    pub p1: GridIndex,
    pub p2: GridIndex,
    pub covariance: f64,
    pub total_weight: f64,
    pub weighted_covariance: f64,
    /// Share of the ray's total variance, in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_of_total: Option<f64>,
    /// Sub-entries by descending absolute weight
    pub entries: Vec<SubEntry>,
}

impl EntrySummary {
    fn new(accumulator: &RayEntryAccumulator, total_variance: f64) -> Self {
        let (p1, p2) = accumulator.points();
        let weighted_covariance = accumulator.weighted_covariance();
        EntrySummary {
            p1,
            p2,
            covariance: accumulator.covariance(),
            total_weight: accumulator.total_weight(),
            weighted_covariance,
            percent_of_total: (total_variance != 0.0)
                .then(|| 100.0 * weighted_covariance / total_variance),
            entries: accumulator.entries().to_vec(),
        }
    }
}

/// Variance decomposition of one finalized ray.
#[derive(Debug, PartialEq, Serialize)]
pub struct RaySummary {
    pub ray: RayIdentity,
    pub diagonal_variance: f64,
    pub off_diagonal_variance: f64,
    pub non_represented_variance: f64,
    pub total_variance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub represented_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_receiver_distance_km: Option<f64>,
    /// Number of grid point pairs touching the ray
    pub entry_count: usize,
    /// Largest diagonal entries
    pub diagonal: Vec<EntrySummary>,
    /// Largest off-diagonal entries
    pub off_diagonal: Vec<EntrySummary>,
    /// Largest non-represented entries
    pub non_represented: Vec<EntrySummary>,
}

impl RaySummary {
    /// Summarise a finalized ray, keeping the `top_n` largest entries of each category.
    pub fn from_aggregator(ray: &RayAggregator, top_n: usize) -> Self {
        let total_variance = ray.total_variance();
        let top = |category: VarianceCategory| -> Vec<EntrySummary> {
            ray.category(category)
                .take(top_n)
                .map(|accumulator| EntrySummary::new(accumulator, total_variance))
                .collect()
        };
        RaySummary {
            ray: ray.identity().clone(),
            diagonal_variance: ray.diagonal_variance(),
            off_diagonal_variance: ray.off_diagonal_variance(),
            non_represented_variance: ray.non_represented_variance(),
            total_variance,
            represented_fraction: ray.represented_fraction(),
            source_receiver_distance_km: ray.source_receiver_distance_km(),
            entry_count: ray.accumulators().len(),
            diagonal: top(VarianceCategory::Diagonal),
            off_diagonal: top(VarianceCategory::OffDiagonal),
            non_represented: top(VarianceCategory::NonRepresented),
        }
    }
}

/// A ray abandoned during a run.
#[derive(Debug, PartialEq, Serialize)]
pub struct RayFailure {
    pub ray: RayIdentity,
    pub error: ErrorReport,
}

impl RayFailure {
    pub fn new(ray: RayIdentity, error: &AggregationError) -> Self {
        RayFailure {
            ray,
            error: error.into(),
        }
    }
}

/// Result of an aggregation run.
#[derive(Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub max_represented_column: GridIndex,
    pub ray_count: usize,
    pub rays: Vec<RaySummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RayFailure>,
}

impl RunReport {
    /// Write the report as JSON to `writer`.
    pub fn write<W: Write>(&self, writer: W) -> Result<(), AggregationError> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the report as JSON to a file.
    pub fn write_file(&self, path: &Path) -> Result<(), AggregationError> {
        self.write(File::create(path)?)
    }

    /// Write one JSON file per ray into `dir`, returning the paths written.
    pub fn write_ray_files(&self, dir: &Path) -> Result<Vec<PathBuf>, AggregationError> {
        fs::create_dir_all(dir)?;
        let mut paths = Vec::with_capacity(self.rays.len());
        for summary in &self.rays {
            let path = dir.join(format!("{}.json", summary.ray.file_stem()));
            let mut writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(&mut writer, summary)?;
            writer.flush()?;
            paths.push(path);
        }
        Ok(paths)
    }
}
