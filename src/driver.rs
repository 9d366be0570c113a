//! Batch aggregation run.
//!
//! A run proceeds in three stages:
//!
//! 1. fragment files are loaded and merged into a single [PartialResultIndex]
//! 2. every [RayDefinition] is registered in the [RayCatalog]
//! 3. every ray is merged against the complete index and finalized
//!
//! The index is complete before the first ray merge starts. Ray merges only read the index and
//! only write to their own ray, so rays are processed in parallel when Rayon is enabled.

use crate::aggregator::RayAggregator;
use crate::catalog::RayCatalog;
use crate::cli::{self, CommandLineArgs};
use crate::codec;
use crate::compression::FragmentCompression;
use crate::context::{AggregationContext, VarianceConfig};
use crate::error::{log_error_chain, AggregationError, Severity};
use crate::index::PartialResultIndex;
use crate::metrics;
use crate::models::RayDefinition;
use crate::report::{RayFailure, RaySummary, RunReport};

use hashbrown::HashSet;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use validator::Validate;

/// Content digests of the fragments delivered so far.
///
/// Merging is not idempotent, so a fragment delivered twice must be rejected before it reaches
/// the index. Every contribution carries its emitting task, host and block origin, so fragments
/// from distinct tasks never share a digest unless both are empty. Empty fragments add nothing
/// to the index and are not recorded.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    digests: HashSet<String>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the delivery of a fragment, failing if its content was already delivered.
    pub fn record(&mut self, path: &Path, data: &[u8]) -> Result<(), AggregationError> {
        let digest = format!("{:x}", md5::compute(data));
        if self.digests.contains(&digest) {
            metrics::DUPLICATE_DELIVERIES.inc();
            return Err(AggregationError::DuplicateDelivery {
                path: path.display().to_string(),
                digest,
            });
        }
        self.digests.insert(digest);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Read ray definitions from a JSON file holding a list of them.
pub fn load_ray_definitions(path: &Path) -> Result<Vec<RayDefinition>, AggregationError> {
    let data = fs::read(path)?;
    let definitions: Vec<RayDefinition> = serde_json::from_slice(&data)?;
    for definition in &definitions {
        definition.validate()?;
    }
    Ok(definitions)
}

/// Load fragment files and merge them, in path order, into one index.
#[tracing::instrument(level = "DEBUG", skip(ledger))]
pub fn load_fragments(
    paths: &[PathBuf],
    compression: FragmentCompression,
    use_rayon: bool,
    ledger: &mut DeliveryLedger,
) -> Result<PartialResultIndex, AggregationError> {
    let read = |path: &PathBuf| fs::read(path).map_err(AggregationError::from);
    let contents: Vec<Vec<u8>> = if use_rayon {
        paths.par_iter().map(read).collect::<Result<_, _>>()?
    } else {
        paths.iter().map(read).collect::<Result<_, _>>()?
    };
    let decode = |data: &Vec<u8>| codec::decode_fragment(data, compression);
    let fragments: Vec<PartialResultIndex> = if use_rayon {
        contents.par_iter().map(decode).collect::<Result<_, _>>()?
    } else {
        contents.iter().map(decode).collect::<Result<_, _>>()?
    };
    for ((path, data), fragment) in paths.iter().zip(&contents).zip(&fragments) {
        if !fragment.is_empty() {
            ledger.record(path, data)?;
        }
    }

    let mut index = PartialResultIndex::new();
    for (path, fragment) in paths.iter().zip(fragments) {
        tracing::debug!(
            "Merging fragment {} ({} buckets)",
            path.display(),
            fragment.bucket_count()
        );
        index.merge(fragment);
        metrics::FRAGMENTS_LOADED.inc();
    }
    Ok(index)
}

/// Register the defined rays in `catalog`.
///
/// Influence weights and positions are copied into each ray, and the source is resolved when
/// its position is known.
pub fn register_rays(
    catalog: &mut RayCatalog,
    definitions: &[RayDefinition],
) -> Result<(), AggregationError> {
    for definition in definitions {
        let position = catalog.add_ray(definition.identity())?;
        let ray = &mut catalog.all_mut()[position];
        ray.set_receiver_weights(
            &definition.receiver_a_weights,
            definition.receiver_b_weights.as_ref(),
        );
        if let Some(source_weights) = &definition.source_weights {
            ray.set_source_weights(source_weights);
        }
        ray.set_receiver_positions(
            definition.receiver_a_position,
            definition.receiver_b_position,
        );
        if let Some(source) = definition.resolved_source() {
            ray.resolve_source(source)?;
        }
    }
    Ok(())
}

/// Merge one ray against the complete index and finalize it.
///
/// Receiver-pair rays take both the receiver-pair and the single receiver contributions.
pub fn process_ray(
    ray: &mut RayAggregator,
    index: &PartialResultIndex,
) -> Result<(), AggregationError> {
    let start = Instant::now();
    let mut count = 0;
    if ray.identity().is_type_ab() {
        count += ray.merge_receiver_pair(index)?;
    }
    count += ray.merge_single_receiver(index)?;
    ray.finalize();
    tracing::debug!(
        "Finalized ray {} from {} contributions: total variance {}",
        ray.identity(),
        count,
        ray.total_variance()
    );
    metrics::record_ray(ray.identity().is_type_ab(), start.elapsed());
    Ok(())
}

/// Process every ray of the catalog, returning the rays that failed.
///
/// Fails on the first run-level error, or on any error when `fail_fast` is set.
#[tracing::instrument(level = "DEBUG", skip(catalog, index))]
pub fn process_rays(
    catalog: &mut RayCatalog,
    index: &PartialResultIndex,
    use_rayon: bool,
    fail_fast: bool,
) -> Result<Vec<RayFailure>, AggregationError> {
    let process = |ray: &mut RayAggregator| {
        process_ray(ray, index).map_err(|error| (ray.identity().clone(), error))
    };
    let results: Vec<_> = if use_rayon {
        catalog.all_mut().par_iter_mut().map(process).collect()
    } else {
        let mut results = Vec::with_capacity(catalog.len());
        for ray in catalog.all_mut() {
            let result = process(ray);
            let abort = match &result {
                Err((_, error)) => fail_fast || error.severity() == Severity::Run,
                Ok(()) => false,
            };
            results.push(result);
            if abort {
                break;
            }
        }
        results
    };

    let mut failures = Vec::new();
    for (ray, error) in results.into_iter().filter_map(Result::err) {
        if fail_fast || error.severity() == Severity::Run {
            return Err(error);
        }
        log_error_chain(&error);
        failures.push(RayFailure::new(ray, &error));
    }
    Ok(failures)
}

/// Run an aggregation over already loaded inputs.
pub fn aggregate(
    context: &mut AggregationContext,
    definitions: &[RayDefinition],
    use_rayon: bool,
    fail_fast: bool,
    top_entries: usize,
) -> Result<RunReport, AggregationError> {
    register_rays(&mut context.catalog, definitions)?;
    tracing::info!(
        "Registered {} rays against {} buckets holding {} contributions",
        context.catalog.len(),
        context.index.bucket_count(),
        context.index.contribution_count()
    );
    let failures = process_rays(&mut context.catalog, &context.index, use_rayon, fail_fast)?;
    let rays: Vec<RaySummary> = context
        .catalog
        .all()
        .iter()
        .filter(|ray| ray.is_finalized())
        .map(|ray| RaySummary::from_aggregator(ray, top_entries))
        .collect();
    tracing::info!(
        "Finalized {} rays, {} failed",
        rays.len(),
        failures.len()
    );
    Ok(RunReport {
        run_id: context.run_id,
        max_represented_column: context.config.max_represented_column,
        ray_count: context.catalog.len(),
        rays,
        failures,
    })
}

/// Run a complete aggregation described by command line arguments.
#[tracing::instrument(level = "INFO", skip(args))]
pub fn run(args: &CommandLineArgs) -> Result<RunReport, AggregationError> {
    let mut context = AggregationContext::new(VarianceConfig::from(args));
    tracing::info!("Starting aggregation run {}", context.run_id);
    let definitions = load_ray_definitions(&cli::expand_path(&args.rays)?)?;
    let paths = args
        .fragments
        .iter()
        .map(|path| cli::expand_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    let work = |context: &mut AggregationContext| {
        let mut ledger = DeliveryLedger::new();
        context.index = load_fragments(&paths, args.compression, args.use_rayon, &mut ledger)?;
        aggregate(
            context,
            &definitions,
            args.use_rayon,
            args.fail_fast,
            args.top_entries,
        )
    };
    if args.use_rayon {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads())
            .build()?;
        pool.install(|| work(&mut context))
    } else {
        work(&mut context)
    }
}

/// Write the run report, per-ray reports and metrics requested by `args`.
pub fn write_outputs(args: &CommandLineArgs, report: &RunReport) -> Result<(), AggregationError> {
    match &args.output {
        Some(path) => report.write_file(&cli::expand_path(path)?)?,
        None => report.write(std::io::stdout().lock())?,
    }
    if let Some(dir) = &args.ray_output_dir {
        let paths = report.write_ray_files(&cli::expand_path(dir)?)?;
        tracing::info!("Wrote {} ray reports", paths.len());
    }
    if let Some(path) = &args.metrics_file {
        fs::write(cli::expand_path(path)?, metrics::render()?)?;
    }
    Ok(())
}
