//! Ray identities and ray definitions

use crate::geometry::{EarthPosition, ResolvedSource};
use crate::influence::InfluenceWeightMap;
use crate::types::{ReceiverId, SeismicPhase, SourceId};

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

/// Identity of a ray: the 5-level composite key of the
/// [RayCatalog](crate::catalog::RayCatalog).
///
/// An absent receiver B denotes a single receiver (AA) ray. A receiver B equal to receiver A is
/// normalised away on construction, so both spellings of an AA ray compare equal.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct RayIdentity {
    /// Name of the tomography model
    pub model_name: String,
    /// Seismic phase
    pub phase: SeismicPhase,
    /// Receiver A
    pub receiver_a: ReceiverId,
    /// Receiver B (receiver-pair rays only)
    pub receiver_b: Option<ReceiverId>,
    /// Source id
    pub source_id: SourceId,
}

impl RayIdentity {
    /// Return a new RayIdentity.
    pub fn new(
        model_name: impl Into<String>,
        phase: SeismicPhase,
        receiver_a: ReceiverId,
        receiver_b: Option<ReceiverId>,
        source_id: SourceId,
    ) -> Self {
        RayIdentity {
            model_name: model_name.into(),
            phase,
            receiver_a,
            receiver_b: receiver_b.filter(|b| *b != receiver_a),
            source_id,
        }
    }

    /// Return a new single receiver (AA) RayIdentity.
    pub fn single(
        model_name: impl Into<String>,
        phase: SeismicPhase,
        receiver: ReceiverId,
        source_id: SourceId,
    ) -> Self {
        Self::new(model_name, phase, receiver, None, source_id)
    }

    /// Return a new receiver-pair (AB) RayIdentity.
    pub fn pair(
        model_name: impl Into<String>,
        phase: SeismicPhase,
        receiver_a: ReceiverId,
        receiver_b: ReceiverId,
        source_id: SourceId,
    ) -> Self {
        Self::new(model_name, phase, receiver_a, Some(receiver_b), source_id)
    }

    /// True for receiver-pair (AB) rays.
    pub fn is_type_ab(&self) -> bool {
        self.receiver_b.is_some()
    }

    /// File name stem used when writing one report file per ray.
    pub fn file_stem(&self) -> String {
        match self.receiver_b {
            Some(receiver_b) => format!(
                "debugRay_{}_{}_{}_{}",
                self.phase, self.receiver_a, receiver_b, self.source_id
            ),
            None => format!(
                "debugRay_{}_{}_{}",
                self.phase, self.receiver_a, self.source_id
            ),
        }
    }
}

impl fmt::Display for RayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model_name, self.phase, self.receiver_a)?;
        if let Some(receiver_b) = self.receiver_b {
            write!(f, "-{}", receiver_b)?;
        }
        write!(f, "/{}", self.source_id)
    }
}

/// Definition of a ray to aggregate
///
/// This is the input record of an aggregation run, produced by the ray tracing and
/// interpolation stage.
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_ray_definition"))]
pub struct RayDefinition {
    /// Name of the tomography model
    #[validate(length(min = 1, message = "model_name must not be empty"))]
    pub model_name: String,
    /// Seismic phase
    pub phase: SeismicPhase,
    /// Receiver A
    pub receiver_a: ReceiverId,
    /// Receiver B (receiver-pair rays only)
    pub receiver_b: Option<ReceiverId>,
    /// Source id
    pub source_id: SourceId,
    /// Influence weights of receiver A
    pub receiver_a_weights: InfluenceWeightMap,
    /// Influence weights of receiver B
    pub receiver_b_weights: Option<InfluenceWeightMap>,
    /// Influence weights of the source
    pub source_weights: Option<InfluenceWeightMap>,
    /// Position of receiver A
    pub receiver_a_position: Option<EarthPosition>,
    /// Position of receiver B
    pub receiver_b_position: Option<EarthPosition>,
    /// Position of the source. Receiver-pair rays cannot be merged without it.
    pub source_position: Option<EarthPosition>,
}

impl RayDefinition {
    /// Identity of the defined ray.
    pub fn identity(&self) -> RayIdentity {
        RayIdentity::new(
            self.model_name.clone(),
            self.phase,
            self.receiver_a,
            self.receiver_b,
            self.source_id,
        )
    }

    /// The resolved source, if the source position is known.
    pub fn resolved_source(&self) -> Option<ResolvedSource> {
        self.source_position
            .map(|position| ResolvedSource::new(self.source_id, position))
    }
}

/// Validate that influence weights are finite
fn validate_weights(
    name: &'static str,
    weights: &InfluenceWeightMap,
) -> Result<(), ValidationError> {
    if !weights.is_finite() {
        let mut error = ValidationError::new("Influence weights must be finite");
        error.add_param("weights".into(), &name);
        return Err(error);
    }
    Ok(())
}

/// Validate a ray definition
fn validate_ray_definition(definition: &RayDefinition) -> Result<(), ValidationError> {
    if definition.receiver_a_weights.is_empty() {
        return Err(ValidationError::new(
            "receiver_a_weights must not be empty",
        ));
    }
    validate_weights("receiver_a_weights", &definition.receiver_a_weights)?;
    if let Some(weights) = &definition.receiver_b_weights {
        validate_weights("receiver_b_weights", weights)?;
    }
    if let Some(weights) = &definition.source_weights {
        validate_weights("source_weights", weights)?;
    }
    if definition.identity().is_type_ab() && definition.receiver_b_weights.is_none() {
        let mut error = ValidationError::new("Receiver-pair rays require receiver_b_weights");
        error.add_param("receiver_b".into(), &definition.receiver_b);
        return Err(error);
    }
    Ok(())
}
