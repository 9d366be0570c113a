//! Registry of the rays of an aggregation run.

use crate::aggregator::RayAggregator;
use crate::context::VarianceConfig;
use crate::error::AggregationError;
use crate::models::RayIdentity;

use hashbrown::HashMap;

/// Registry of [RayAggregator]s keyed by [RayIdentity].
///
/// Rays are kept in creation order and are never removed.
#[derive(Clone, Debug)]
pub struct RayCatalog {
    config: VarianceConfig,
    rays: Vec<RayAggregator>,
    positions: HashMap<RayIdentity, usize>,
}

impl RayCatalog {
    /// Return an empty RayCatalog whose rays use `config`.
    pub fn new(config: VarianceConfig) -> Self {
        RayCatalog {
            config,
            rays: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn register(&mut self, identity: RayIdentity) -> usize {
        let position = self.rays.len();
        self.rays
            .push(RayAggregator::new(identity.clone(), self.config));
        self.positions.insert(identity, position);
        position
    }

    /// Return the position of a ray, registering it first if necessary.
    pub fn get_or_create(&mut self, identity: RayIdentity) -> usize {
        match self.positions.get(&identity).copied() {
            Some(position) => position,
            None => self.register(identity),
        }
    }

    /// Register a new ray, returning its position.
    ///
    /// Fails if the ray is already registered.
    pub fn add_ray(&mut self, identity: RayIdentity) -> Result<usize, AggregationError> {
        if self.positions.contains_key(&identity) {
            return Err(AggregationError::DuplicateRay {
                ray: identity.to_string(),
            });
        }
        Ok(self.register(identity))
    }

    pub fn get(&self, identity: &RayIdentity) -> Option<&RayAggregator> {
        self.positions.get(identity).map(|position| &self.rays[*position])
    }

    /// Ray at a position returned by [add_ray](Self::add_ray) or
    /// [get_or_create](Self::get_or_create).
    pub fn at_mut(&mut self, position: usize) -> Option<&mut RayAggregator> {
        self.rays.get_mut(position)
    }

    /// All rays, in creation order.
    pub fn all(&self) -> &[RayAggregator] {
        &self.rays
    }

    /// All rays, in creation order.
    pub fn all_mut(&mut self) -> &mut [RayAggregator] {
        &mut self.rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Finalize every ray.
    pub fn finalize_all(&mut self) {
        for ray in self.rays.iter_mut() {
            ray.finalize();
        }
    }
}
