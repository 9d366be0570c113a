//! Aggregation context passed explicitly through a run.

use crate::aggregator::RayAggregator;
use crate::catalog::RayCatalog;
use crate::cli::CommandLineArgs;
use crate::error::AggregationError;
use crate::index::PartialResultIndex;
use crate::models::RayIdentity;
use crate::types::GridIndex;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Run-wide variance configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VarianceConfig {
    /// Grid points with an index at or beyond this column are non-represented.
    pub max_represented_column: GridIndex,
    /// Reject contributions whose covariance disagrees with the accumulated pair.
    pub strict_covariance: bool,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        VarianceConfig {
            max_represented_column: GridIndex::MAX,
            strict_covariance: false,
        }
    }
}

impl From<&CommandLineArgs> for VarianceConfig {
    fn from(args: &CommandLineArgs) -> Self {
        VarianceConfig {
            max_represented_column: args.max_represented_column,
            strict_covariance: args.strict_covariance,
        }
    }
}

/// State of one aggregation run, owned by the driver.
#[derive(Debug)]
pub struct AggregationContext {
    /// Variance configuration.
    pub config: VarianceConfig,

    /// Merged partial result index.
    pub index: PartialResultIndex,

    /// Registered rays.
    pub catalog: RayCatalog,

    /// Unique id of this run.
    pub run_id: Uuid,
}

impl AggregationContext {
    /// Create and return an empty [AggregationContext].
    pub fn new(config: VarianceConfig) -> Self {
        Self {
            config,
            index: PartialResultIndex::new(),
            catalog: RayCatalog::new(config),
            run_id: Uuid::new_v4(),
        }
    }
}

/// [RayCatalog] guarded by a mutex, for registration from several threads.
#[derive(Clone, Debug)]
pub struct SharedRayCatalog(Arc<Mutex<RayCatalog>>);

impl SharedRayCatalog {
    /// Wrap a catalog for shared registration.
    pub fn new(catalog: RayCatalog) -> Self {
        SharedRayCatalog(Arc::new(Mutex::new(catalog)))
    }

    // Poisoning is ignored: catalog mutations never panic between the push and the insert.
    fn lock(&self) -> MutexGuard<'_, RayCatalog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new ray, returning its position in the catalog.
    pub fn add_ray(&self, identity: RayIdentity) -> Result<usize, AggregationError> {
        self.lock().add_ray(identity)
    }

    /// Return the position of a ray, registering it first if necessary.
    pub fn get_or_create(&self, identity: RayIdentity) -> usize {
        self.lock().get_or_create(identity)
    }

    /// Run `f` on the ray at `position`, holding the lock for its duration.
    ///
    /// Returns `None` if no ray is registered at `position`.
    pub fn with_ray<T>(
        &self,
        position: usize,
        f: impl FnOnce(&mut RayAggregator) -> T,
    ) -> Option<T> {
        self.lock().at_mut(position).map(f)
    }

    /// Number of registered rays.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no rays are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Return the catalog, once all other handles are dropped.
    ///
    /// Returns `None` while other handles are alive.
    pub fn into_inner(self) -> Option<RayCatalog> {
        Arc::try_unwrap(self.0)
            .ok()
            .map(|mutex| mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeismicPhase;

    #[test]
    fn test_default_config_represents_everything() {
        let config = VarianceConfig::default();
        assert_eq!(GridIndex::MAX, config.max_represented_column);
        assert!(!config.strict_covariance);
    }

    #[test]
    fn test_context_starts_empty() {
        let context = AggregationContext::new(VarianceConfig::default());
        assert!(context.index.is_empty());
        assert!(context.catalog.is_empty());
        assert_ne!(
            context.run_id,
            AggregationContext::new(VarianceConfig::default()).run_id
        );
    }

    #[test]
    fn test_concurrent_registration_keeps_rays_unique() {
        let shared = SharedRayCatalog::new(RayCatalog::new(VarianceConfig::default()));
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let shared = shared.clone();
                scope.spawn(move || {
                    for receiver in 0..10 {
                        shared.get_or_create(RayIdentity::single(
                            "ak135",
                            SeismicPhase::P,
                            receiver,
                            1,
                        ));
                    }
                });
            }
        });
        assert_eq!(10, shared.len());
        let identity = RayIdentity::single("ak135", SeismicPhase::P, 3, 1);
        let position = shared.get_or_create(identity);
        let receiver = shared.with_ray(position, |ray| ray.identity().receiver_a);
        assert_eq!(Some(3), receiver);
        assert_eq!(None, shared.with_ray(10, |ray| ray.identity().receiver_a));
        let error = shared
            .add_ray(RayIdentity::single("ak135", SeismicPhase::P, 3, 1))
            .unwrap_err();
        assert!(matches!(error, AggregationError::DuplicateRay { .. }));
        let catalog = shared.into_inner().unwrap();
        assert_eq!(10, catalog.len());
    }
}
