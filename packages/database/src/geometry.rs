//! `PostGIS` point encoding for incident locations.
//!
//! Points are always built server-side from two bound numeric parameters,
//! longitude first, tagged with SRID 4326 (WGS84).

use cusco_reporta_incident_models::{DEFAULT_LATITUDE, DEFAULT_LONGITUDE};

/// Spatial reference identifier for WGS84.
pub const WGS84_SRID: u32 = 4326;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl GeoPoint {
    /// City-center point used when coordinates are required but missing.
    pub const DEFAULT: Self = Self {
        longitude: DEFAULT_LONGITUDE,
        latitude: DEFAULT_LATITUDE,
    };

    /// Creates a point when both coordinates are present and finite.
    #[must_use]
    pub fn new(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(longitude), Some(latitude)) if longitude.is_finite() && latitude.is_finite() => {
                Some(Self {
                    longitude,
                    latitude,
                })
            }
            _ => None,
        }
    }
}

/// What to store in a geometry column when no usable coordinates were
/// submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPointPolicy {
    /// Store [`GeoPoint::DEFAULT`] so the column is never null.
    DefaultPoint,
    /// Store an explicit `NULL`.
    Null,
}

impl MissingPointPolicy {
    /// Resolves the point to store for the given submitted coordinates.
    #[must_use]
    pub fn resolve(self, longitude: Option<f64>, latitude: Option<f64>) -> Option<GeoPoint> {
        GeoPoint::new(longitude, latitude).or(match self {
            Self::DefaultPoint => Some(GeoPoint::DEFAULT),
            Self::Null => None,
        })
    }
}

/// Builds the point construction expression for the placeholders
/// `$lon_idx` and `$lat_idx`.
#[must_use]
pub fn point_expression(lon_idx: usize, lat_idx: usize) -> String {
    format!(
        "ST_SetSRID(ST_MakePoint(${lon_idx}::double precision, ${lat_idx}::double precision), {WGS84_SRID})"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_requires_both_coordinates() {
        assert_eq!(GeoPoint::new(Some(-71.9), None), None);
        assert_eq!(GeoPoint::new(None, Some(-13.5)), None);
        assert_eq!(GeoPoint::new(Some(f64::NAN), Some(-13.5)), None);
        assert_eq!(
            GeoPoint::new(Some(-71.9), Some(-13.5)),
            Some(GeoPoint {
                longitude: -71.9,
                latitude: -13.5
            })
        );
    }

    #[test]
    fn default_policy_substitutes_city_center() {
        let point = MissingPointPolicy::DefaultPoint.resolve(None, Some(-13.5));
        assert_eq!(point, Some(GeoPoint::DEFAULT));
        assert!((GeoPoint::DEFAULT.longitude - -71.967_46).abs() < 1e-9);
        assert!((GeoPoint::DEFAULT.latitude - -13.531_95).abs() < 1e-9);
    }

    #[test]
    fn null_policy_yields_none() {
        assert_eq!(MissingPointPolicy::Null.resolve(None, None), None);
    }

    #[test]
    fn submitted_point_wins_over_policy() {
        let point = MissingPointPolicy::DefaultPoint.resolve(Some(-72.0), Some(-13.0));
        assert_eq!(
            point,
            Some(GeoPoint {
                longitude: -72.0,
                latitude: -13.0
            })
        );
    }

    #[test]
    fn expression_binds_longitude_first() {
        assert_eq!(
            point_expression(4, 5),
            "ST_SetSRID(ST_MakePoint($4::double precision, $5::double precision), 4326)"
        );
    }
}
