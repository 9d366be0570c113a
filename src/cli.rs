//! Command Line Interface (CLI) arguments.

use crate::compression::FragmentCompression;
use crate::types::GridIndex;

use clap::Parser;
use expanduser::expanduser;
use std::path::PathBuf;

/// rayvar command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// Path to a JSON file holding the list of ray definitions
    #[arg(long, env = "RAYVAR_RAYS")]
    pub rays: String,
    /// Paths to the partial result fragments written by the block covariance tasks
    #[arg(long, value_delimiter = ',', env = "RAYVAR_FRAGMENTS")]
    pub fragments: Vec<String>,
    /// Compression of the fragment files
    #[arg(
        long,
        value_enum,
        default_value_t = FragmentCompression::None,
        env = "RAYVAR_COMPRESSION"
    )]
    pub compression: FragmentCompression,
    /// Grid points with an index at or beyond this column are non-represented
    #[arg(long, default_value_t = GridIndex::MAX, env = "RAYVAR_MAX_REPRESENTED_COLUMN")]
    pub max_represented_column: GridIndex,
    /// Whether to fail a ray when a grid point pair is reported with differing covariances
    #[arg(long, default_value_t = false, env = "RAYVAR_STRICT_COVARIANCE")]
    pub strict_covariance: bool,
    /// Whether to use Rayon to load fragments and process rays in parallel.
    #[arg(long, default_value_t = false, env = "RAYVAR_USE_RAYON")]
    pub use_rayon: bool,
    /// Maximum number of threads used when Rayon is enabled.
    /// Defaults to the number of CPUs.
    #[arg(long, env = "RAYVAR_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Path of the JSON run report. The report is written to stdout if unset
    #[arg(long, env = "RAYVAR_OUTPUT")]
    pub output: Option<String>,
    /// Directory in which to write one JSON report per ray
    #[arg(long, env = "RAYVAR_RAY_OUTPUT_DIR")]
    pub ray_output_dir: Option<String>,
    /// Number of largest entries of each variance category to report per ray
    #[arg(long, default_value_t = 10, env = "RAYVAR_TOP_ENTRIES")]
    pub top_entries: usize,
    /// Abort the run on the first failed ray instead of reporting it
    #[arg(long, default_value_t = false, env = "RAYVAR_FAIL_FAST")]
    pub fail_fast: bool,
    /// Path to which Prometheus metrics are written at the end of the run
    #[arg(long, env = "RAYVAR_METRICS_FILE")]
    pub metrics_file: Option<String>,
}

impl CommandLineArgs {
    /// Number of worker threads to use.
    pub fn threads(&self) -> usize {
        self.thread_limit.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Expand a leading `~` in a path argument.
pub fn expand_path(path: &str) -> std::io::Result<PathBuf> {
    expanduser(path)
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
