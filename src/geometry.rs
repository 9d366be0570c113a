//! Receiver and source positions.
//!
//! Positions are only used to describe a ray in reports (source to receiver distance). The
//! variance decomposition itself never looks at them.

use crate::types::SourceId;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A position given as geographic latitude/longitude and depth below the surface.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EarthPosition {
    /// Latitude in degrees
    pub lat_deg: f64,
    /// Longitude in degrees
    pub lon_deg: f64,
    /// Depth below the surface in kilometres
    #[serde(default)]
    pub depth_km: f64,
}

impl EarthPosition {
    /// Return a new EarthPosition.
    pub fn new(lat_deg: f64, lon_deg: f64, depth_km: f64) -> Self {
        EarthPosition {
            lat_deg,
            lon_deg,
            depth_km,
        }
    }

    /// Earth-centred Cartesian coordinates in kilometres (spherical Earth).
    pub fn to_cartesian(&self) -> [f64; 3] {
        let radius = EARTH_RADIUS_KM - self.depth_km;
        let (lat, lon) = (self.lat_deg.to_radians(), self.lon_deg.to_radians());
        [
            radius * lat.cos() * lon.cos(),
            radius * lat.cos() * lon.sin(),
            radius * lat.sin(),
        ]
    }

    /// Straight line (3D) distance to another position in kilometres.
    pub fn distance_km(&self, other: &EarthPosition) -> f64 {
        let a = self.to_cartesian();
        let b = other.to_cartesian();
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }
}

/// A source whose full description is known.
///
/// Rays may be registered with only a source id; the source is resolved later.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResolvedSource {
    /// Source id, must match the ray's source id
    pub id: SourceId,
    /// Source position
    pub position: EarthPosition,
}

impl ResolvedSource {
    /// Return a new ResolvedSource.
    pub fn new(id: SourceId, position: EarthPosition) -> Self {
        ResolvedSource { id, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_point_radius() {
        let p = EarthPosition::new(0.0, 0.0, 0.0);
        let c = p.to_cartesian();
        assert!((c[0] - EARTH_RADIUS_KM).abs() < 1e-9);
        assert!(c[1].abs() < 1e-9);
        assert!(c[2].abs() < 1e-9);
    }

    #[test]
    fn test_depth_distance() {
        let surface = EarthPosition::new(10.0, 20.0, 0.0);
        let deep = EarthPosition::new(10.0, 20.0, 100.0);
        assert!((surface.distance_km(&deep) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_antipodes() {
        let a = EarthPosition::new(0.0, 0.0, 0.0);
        let b = EarthPosition::new(0.0, 180.0, 0.0);
        assert!((a.distance_km(&b) - 2.0 * EARTH_RADIUS_KM).abs() < 1e-6);
        assert_eq!(a.distance_km(&b), b.distance_km(&a));
    }

    #[test]
    fn test_deserialise_default_depth() {
        let p: EarthPosition =
            serde_json::from_str(r#"{"lat_deg": 1.5, "lon_deg": -2.0}"#).unwrap();
        assert_eq!(EarthPosition::new(1.5, -2.0, 0.0), p);
    }
}
