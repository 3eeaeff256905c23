//! # Constants and type definitions for geotrack
//!
//! This module centralizes the **geodetic constants**, **conversion factors**, and **common type
//! aliases** used throughout the library.
//!
//! ## Overview
//!
//! - WGS84 / GRS80 ellipsoid parameters
//! - Unit conversions (degrees ↔ radians)
//! - Core type aliases used across the crate
//! - Reserved analytical feature names
//! - Numerical tolerances shared by the solvers

// -------------------------------------------------------------------------------------------------
// Geodetic constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Radians → degrees
pub const DEGRAD: f64 = 180.0 / std::f64::consts::PI;

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS84 semi-minor axis (meters)
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// GRS80 flattening (used by Lambert-93, numerically identical to WGS84 at the mm level)
pub const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// GRS80 first eccentricity squared
pub const GRS80_E2: f64 = GRS80_F * (2.0 - GRS80_F);

/// Sphere radius of the haversine distance on geographic coordinates (WGS84 semi-major axis)
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-9;

/// Regulariser added on the diagonal of Gram matrices before a Cholesky factorisation
pub const GRAM_REGULARISER: f64 = 1e-8;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in meters
pub type Meter = f64;
/// Duration in seconds
pub type Second = f64;

/// Identifier of a node in a road network
pub type NodeId = u64;
/// Identifier of an edge in a road network
pub type EdgeId = u64;

// -------------------------------------------------------------------------------------------------
// Reserved names
// -------------------------------------------------------------------------------------------------

/// Names that always resolve to the observation position and timestamp.
/// They can be read as columns but never created as analytical features.
pub const RESERVED_FEATURE_NAMES: [&str; 4] = ["x", "y", "z", "t"];

/// Returns `true` if `name` is one of the reserved column names (`x`, `y`, `z`, `t`).
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_FEATURE_NAMES.contains(&name)
}

#[cfg(test)]
mod constants_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ellipsoid() {
        assert_relative_eq!(WGS84_B, 6_356_752.314_245, epsilon = 1e-3);
        assert_relative_eq!(WGS84_E2, 0.006_694_379_990_14, epsilon = 1e-12);
    }

    #[test]
    fn test_reserved() {
        assert!(is_reserved_name("x"));
        assert!(is_reserved_name("t"));
        assert!(!is_reserved_name("speed"));
    }
}
