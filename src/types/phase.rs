use crate::error::AggregationError;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;

/// Seismic phases for which ray variances are decomposed.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum SeismicPhase {
    P,
    Pn,
    Pg,
    Pb,
    S,
    Sn,
    Sg,
    Sb,
    Lg,
    PcP,
    ScS,
    PKP,
    PKiKP,
    SKS,
}

/// All phases, in declaration order.
pub const ALL_PHASES: [SeismicPhase; 14] = [
    SeismicPhase::P,
    SeismicPhase::Pn,
    SeismicPhase::Pg,
    SeismicPhase::Pb,
    SeismicPhase::S,
    SeismicPhase::Sn,
    SeismicPhase::Sg,
    SeismicPhase::Sb,
    SeismicPhase::Lg,
    SeismicPhase::PcP,
    SeismicPhase::ScS,
    SeismicPhase::PKP,
    SeismicPhase::PKiKP,
    SeismicPhase::SKS,
];

impl FromStr for SeismicPhase {
    type Err = AggregationError;

    /// Phase names are case sensitive ("Pn" and "PN" are not the same phase).
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ALL_PHASES
            .iter()
            .copied()
            .find(|phase| phase.to_string() == name)
            .ok_or_else(|| AggregationError::UnknownPhase {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json;

    #[test]
    fn test_display_round_trip() {
        for phase in ALL_PHASES {
            assert_eq!(phase, phase.to_string().parse::<SeismicPhase>().unwrap());
        }
    }

    #[test]
    fn test_unknown_phase() {
        let err = "PN".parse::<SeismicPhase>().unwrap_err();
        match err {
            AggregationError::UnknownPhase { name } => assert_eq!("PN", name),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn test_deserialise() {
        let pn: SeismicPhase = serde_json::from_str(r#""Pn""#).unwrap();
        assert_eq!(SeismicPhase::Pn, pn);
        let pkikp: SeismicPhase = serde_json::from_str(r#""PKiKP""#).unwrap();
        assert_eq!(SeismicPhase::PKiKP, pkikp);
    }
}
