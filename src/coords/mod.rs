//! # Coordinate systems
//!
//! Three coordinate frames are supported, modelled as a closed sum type [`Coord`]:
//!
//! * [`GeoCoords`] – geographic longitude / latitude (degrees) and ellipsoidal height (meters),
//! * [`EnuCoords`] – local East / North / Up tangent plane (meters), relative to a geographic base,
//! * [`EcefCoords`] – Earth-Centred Earth-Fixed cartesian coordinates (meters).
//!
//! Every variant converts to every other one. Conversions never mutate the coord in place:
//! they return a fresh value. ENU conversions need a geographic `base` (the tangent point).
//!
//! A numeric SRID (see [`Srid`]) selects a map projection ([`projection::Projection`]).
//! Projected coordinates are carried by the ENU variant (easting, northing, height).
//!
//! The accessors [`Coord::get_x`], [`Coord::get_y`], [`Coord::get_z`] are *semantic* aliases:
//! `(lon, lat, hgt)`, `(e, n, u)` or `(x, y, z)` depending on the variant.
pub mod projection;

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::constants::{Degree, Meter, Radian, DEGRAD, EARTH_RADIUS, RADEG, WGS84_A, WGS84_B, WGS84_E2};
use crate::track_errors::TrackError;

/// Geographic coordinates on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoords {
    pub lon: Degree,
    pub lat: Degree,
    pub hgt: Meter,
}

/// Local tangent plane coordinates (East, North, Up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnuCoords {
    pub e: Meter,
    pub n: Meter,
    pub u: Meter,
}

/// Earth-Centred Earth-Fixed cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcefCoords {
    pub x: Meter,
    pub y: Meter,
    pub z: Meter,
}

/// A position expressed in one of the three supported frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Coord {
    Geo(GeoCoords),
    Enu(EnuCoords),
    Ecef(EcefCoords),
}

/// Spatial reference identifier of a track.
///
/// `Proj(code)` is a map projection (Lambert-93 = 2154, UTM north = 326zz, UTM south = 327zz);
/// observations of a projected track are stored as ENU-variant coords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Srid {
    Geo,
    Enu,
    Ecef,
    Proj(u32),
}

impl Srid {
    /// Build a SRID from a numeric code.
    ///
    /// `4326` maps to [`Srid::Geo`], `4978` to [`Srid::Ecef`]; supported projection codes
    /// are `2154` and `32601..=32660`, `32701..=32760`.
    pub fn from_code(code: u32) -> Result<Self, TrackError> {
        match code {
            4326 => Ok(Srid::Geo),
            4978 => Ok(Srid::Ecef),
            _ => {
                projection::Projection::from_srid(code)?;
                Ok(Srid::Proj(code))
            }
        }
    }

    /// `true` for frames where euclidean geometry is meaningful (ENU and projections).
    pub fn is_euclidean(&self) -> bool {
        matches!(self, Srid::Enu | Srid::Proj(_))
    }
}

impl fmt::Display for Srid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Srid::Geo => write!(f, "GEO"),
            Srid::Enu => write!(f, "ENU"),
            Srid::Ecef => write!(f, "ECEF"),
            Srid::Proj(code) => write!(f, "EPSG:{code}"),
        }
    }
}

impl FromStr for Srid {
    type Err = TrackError;

    /// Accepts `"ENU"`/`"ENUCoords"`, `"GEO"`/`"GeoCoords"`, `"ECEF"`/`"ECEFCoords"`
    /// (case-insensitive) and integer projection codes, optionally prefixed by `EPSG:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "ENU" | "ENUCOORDS" => Ok(Srid::Enu),
            "GEO" | "GEOCOORDS" => Ok(Srid::Geo),
            "ECEF" | "ECEFCOORDS" => Ok(Srid::Ecef),
            other => {
                let digits = other.strip_prefix("EPSG:").unwrap_or(other);
                let code = digits
                    .parse::<u32>()
                    .map_err(|_| TrackError::UnknownCoordCode(trimmed.to_string()))?;
                Srid::from_code(code)
            }
        }
    }
}

/// Rotation matrix from ECEF deltas to the local ENU frame at `(lon, lat)`.
fn enu_rotation(lon: Radian, lat: Radian) -> Matrix3<f64> {
    let (sl, cl) = lon.sin_cos();
    let (sp, cp) = lat.sin_cos();
    Matrix3::new(
        -sl,
        cl,
        0.0,
        -sp * cl,
        -sp * sl,
        cp,
        cp * cl,
        cp * sl,
        sp,
    )
}

impl GeoCoords {
    pub fn new(lon: Degree, lat: Degree, hgt: Meter) -> Self {
        GeoCoords { lon, lat, hgt }
    }

    pub fn to_ecef(&self) -> EcefCoords {
        let lon = self.lon * RADEG;
        let lat = self.lat * RADEG;
        let (sp, cp) = lat.sin_cos();
        let n = WGS84_A / (1.0 - WGS84_E2 * sp * sp).sqrt();
        EcefCoords {
            x: (n + self.hgt) * cp * lon.cos(),
            y: (n + self.hgt) * cp * lon.sin(),
            z: (n * (1.0 - WGS84_E2) + self.hgt) * sp,
        }
    }

    pub fn to_enu(&self, base: &GeoCoords) -> EnuCoords {
        self.to_ecef().to_enu(base)
    }

    /// Great-circle distance on a sphere of radius [`EARTH_RADIUS`] (haversine).
    pub fn distance_2d(&self, other: &GeoCoords) -> Meter {
        let phi1 = self.lat * RADEG;
        let phi2 = other.lat * RADEG;
        let dphi = phi2 - phi1;
        let dlambda = (other.lon - self.lon) * RADEG;
        let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().min(1.0).asin()
    }

    pub fn distance_3d(&self, other: &GeoCoords) -> Meter {
        self.distance_2d(other).hypot(other.hgt - self.hgt)
    }
}

impl EcefCoords {
    pub fn new(x: Meter, y: Meter, z: Meter) -> Self {
        EcefCoords { x, y, z }
    }

    fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Iterative geodetic latitude recovery (converges to sub-millimetre in a few steps).
    pub fn to_geo(&self) -> GeoCoords {
        let p = self.x.hypot(self.y);
        let lon = self.y.atan2(self.x);

        if p < 1e-9 {
            // on the polar axis
            let lat = if self.z >= 0.0 { 90.0 } else { -90.0 };
            return GeoCoords::new(0.0, lat, self.z.abs() - WGS84_B);
        }

        let mut lat = self.z.atan2(p * (1.0 - WGS84_E2));
        let mut hgt = 0.0;
        for _ in 0..10 {
            let sp = lat.sin();
            let n = WGS84_A / (1.0 - WGS84_E2 * sp * sp).sqrt();
            hgt = p / lat.cos() - n;
            let next = self.z.atan2(p * (1.0 - WGS84_E2 * n / (n + hgt)));
            let converged = (next - lat).abs() < 1e-14;
            lat = next;
            if converged {
                break;
            }
        }

        GeoCoords::new(lon * DEGRAD, lat * DEGRAD, hgt)
    }

    pub fn to_enu(&self, base: &GeoCoords) -> EnuCoords {
        let origin = base.to_ecef().as_vector();
        let rot = enu_rotation(base.lon * RADEG, base.lat * RADEG);
        let enu = rot * (self.as_vector() - origin);
        EnuCoords::new(enu.x, enu.y, enu.z)
    }
}

impl EnuCoords {
    pub fn new(e: Meter, n: Meter, u: Meter) -> Self {
        EnuCoords { e, n, u }
    }

    pub fn to_ecef(&self, base: &GeoCoords) -> EcefCoords {
        let origin = base.to_ecef().as_vector();
        let rot = enu_rotation(base.lon * RADEG, base.lat * RADEG);
        let xyz = origin + rot.transpose() * Vector3::new(self.e, self.n, self.u);
        EcefCoords::new(xyz.x, xyz.y, xyz.z)
    }

    pub fn to_geo(&self, base: &GeoCoords) -> GeoCoords {
        self.to_ecef(base).to_geo()
    }
}

fn missing_base() -> TrackError {
    TrackError::OutOfDomain("ENU conversion requires a geographic base".into())
}

impl Coord {
    pub fn geo(lon: Degree, lat: Degree, hgt: Meter) -> Self {
        Coord::Geo(GeoCoords::new(lon, lat, hgt))
    }

    pub fn enu(e: Meter, n: Meter, u: Meter) -> Self {
        Coord::Enu(EnuCoords::new(e, n, u))
    }

    pub fn ecef(x: Meter, y: Meter, z: Meter) -> Self {
        Coord::Ecef(EcefCoords::new(x, y, z))
    }

    /// Build a coord of the variant carried by `srid` from raw components.
    pub fn from_xyz(srid: Srid, x: f64, y: f64, z: f64) -> Self {
        match srid {
            Srid::Geo => Coord::geo(x, y, z),
            Srid::Ecef => Coord::ecef(x, y, z),
            Srid::Enu | Srid::Proj(_) => Coord::enu(x, y, z),
        }
    }

    /// Short name of the variant, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Coord::Geo(_) => "GEO",
            Coord::Enu(_) => "ENU",
            Coord::Ecef(_) => "ECEF",
        }
    }

    pub fn get_x(&self) -> f64 {
        match self {
            Coord::Geo(c) => c.lon,
            Coord::Enu(c) => c.e,
            Coord::Ecef(c) => c.x,
        }
    }

    pub fn get_y(&self) -> f64 {
        match self {
            Coord::Geo(c) => c.lat,
            Coord::Enu(c) => c.n,
            Coord::Ecef(c) => c.y,
        }
    }

    pub fn get_z(&self) -> f64 {
        match self {
            Coord::Geo(c) => c.hgt,
            Coord::Enu(c) => c.u,
            Coord::Ecef(c) => c.z,
        }
    }

    /// Returns a copy with the semantic components replaced, keeping the variant.
    pub fn with_xyz(&self, x: f64, y: f64, z: f64) -> Self {
        match self {
            Coord::Geo(_) => Coord::geo(x, y, z),
            Coord::Enu(_) => Coord::enu(x, y, z),
            Coord::Ecef(_) => Coord::ecef(x, y, z),
        }
    }

    pub fn with_x(&self, x: f64) -> Self {
        self.with_xyz(x, self.get_y(), self.get_z())
    }

    pub fn with_y(&self, y: f64) -> Self {
        self.with_xyz(self.get_x(), y, self.get_z())
    }

    pub fn with_z(&self, z: f64) -> Self {
        self.with_xyz(self.get_x(), self.get_y(), z)
    }

    /// Convert to geographic coordinates. ENU input needs its `base`.
    pub fn to_geo(&self, base: Option<&GeoCoords>) -> Result<Coord, TrackError> {
        match self {
            Coord::Geo(c) => Ok(Coord::Geo(*c)),
            Coord::Ecef(c) => Ok(Coord::Geo(c.to_geo())),
            Coord::Enu(c) => Ok(Coord::Geo(c.to_geo(base.ok_or_else(missing_base)?))),
        }
    }

    /// Convert to ECEF. ENU input needs its `base`.
    pub fn to_ecef(&self, base: Option<&GeoCoords>) -> Result<Coord, TrackError> {
        match self {
            Coord::Geo(c) => Ok(Coord::Ecef(c.to_ecef())),
            Coord::Ecef(c) => Ok(Coord::Ecef(*c)),
            Coord::Enu(c) => Ok(Coord::Ecef(c.to_ecef(base.ok_or_else(missing_base)?))),
        }
    }

    /// Convert to the ENU frame tangent at `base`.
    ///
    /// A geographic coord without base is its own tangent point (result is the origin).
    /// An ENU coord is returned unchanged when no base is given; with a base it is
    /// understood as already expressed relative to that base.
    pub fn to_enu(&self, base: Option<&GeoCoords>) -> Result<Coord, TrackError> {
        match self {
            Coord::Geo(c) => {
                let base = base.copied().unwrap_or(*c);
                Ok(Coord::Enu(c.to_enu(&base)))
            }
            Coord::Ecef(c) => Ok(Coord::Enu(c.to_enu(base.ok_or_else(missing_base)?))),
            Coord::Enu(c) => Ok(Coord::Enu(*c)),
        }
    }

    /// Planar counter-clockwise rotation of `(x, y)` around the origin.
    pub fn rotate(&self, theta: Radian) -> Coord {
        let (s, c) = theta.sin_cos();
        let x = self.get_x();
        let y = self.get_y();
        self.with_xyz(c * x - s * y, s * x + c * y, self.get_z())
    }

    /// Planar homothety of `(x, y)` centred on the origin.
    pub fn scale(&self, k: f64) -> Coord {
        self.with_xyz(k * self.get_x(), k * self.get_y(), self.get_z())
    }

    pub fn translate(&self, tx: f64, ty: f64, tz: f64) -> Coord {
        self.with_xyz(self.get_x() + tx, self.get_y() + ty, self.get_z() + tz)
    }

    /// Horizontal distance: haversine for two geographic coords, planar euclidean otherwise.
    pub fn distance_2d(&self, other: &Coord) -> Meter {
        match (self, other) {
            (Coord::Geo(a), Coord::Geo(b)) => a.distance_2d(b),
            _ => (other.get_x() - self.get_x()).hypot(other.get_y() - self.get_y()),
        }
    }

    pub fn distance_3d(&self, other: &Coord) -> Meter {
        match (self, other) {
            (Coord::Geo(a), Coord::Geo(b)) => a.distance_3d(b),
            _ => {
                let dx = other.get_x() - self.get_x();
                let dy = other.get_y() - self.get_y();
                let dz = other.get_z() - self.get_z();
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
        }
    }

    pub fn dot(&self, other: &Coord) -> f64 {
        self.get_x() * other.get_x() + self.get_y() * other.get_y() + self.get_z() * other.get_z()
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn norm_2d(&self) -> f64 {
        self.get_x().hypot(self.get_y())
    }

    /// Planar azimuth of the vector `self → other`, in radians clockwise from north.
    pub fn azimuth_to(&self, other: &Coord) -> Radian {
        let dx = other.get_x() - self.get_x();
        let dy = other.get_y() - self.get_y();
        dx.atan2(dy).rem_euclid(crate::constants::DPI)
    }
}

/// Component-wise sum. The result keeps the variant of the left operand.
impl Add for Coord {
    type Output = Coord;

    fn add(self, rhs: Coord) -> Coord {
        self.translate(rhs.get_x(), rhs.get_y(), rhs.get_z())
    }
}

/// Component-wise difference. The result keeps the variant of the left operand.
impl Sub for Coord {
    type Output = Coord;

    fn sub(self, rhs: Coord) -> Coord {
        self.translate(-rhs.get_x(), -rhs.get_y(), -rhs.get_z())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Geo(c) => write!(f, "[lon={:.9}, lat={:.9}, hgt={:.3}]", c.lon, c.lat, c.hgt),
            Coord::Enu(c) => write!(f, "[e={:.3}, n={:.3}, u={:.3}]", c.e, c.n, c.u),
            Coord::Ecef(c) => write!(f, "[x={:.3}, y={:.3}, z={:.3}]", c.x, c.y, c.z),
        }
    }
}

#[cfg(test)]
mod coords_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_geo_ecef_round_trip() {
        let geo = GeoCoords::new(2.4243, 48.8445, 120.5);
        let ecef = geo.to_ecef();
        let back = ecef.to_geo();
        assert_relative_eq!(back.lon, geo.lon, epsilon = 1e-10);
        assert_relative_eq!(back.lat, geo.lat, epsilon = 1e-10);
        assert_relative_eq!(back.hgt, geo.hgt, epsilon = 1e-5);
    }

    #[test]
    fn test_equator_ecef() {
        let ecef = GeoCoords::new(0.0, 0.0, 0.0).to_ecef();
        assert_relative_eq!(ecef.x, WGS84_A, epsilon = 1e-6);
        assert_relative_eq!(ecef.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(ecef.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pole_ecef() {
        let geo = EcefCoords::new(0.0, 0.0, WGS84_B + 10.0).to_geo();
        assert_relative_eq!(geo.lat, 90.0);
        assert_relative_eq!(geo.hgt, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_enu_round_trip() {
        let base = GeoCoords::new(2.0, 45.0, 0.0);
        let point = GeoCoords::new(2.001, 45.001, 35.0);
        let enu = point.to_enu(&base);
        assert!(enu.e > 70.0 && enu.e < 80.0);
        assert!(enu.n > 105.0 && enu.n < 115.0);
        let back = enu.to_geo(&base);
        assert_relative_eq!(back.lon, point.lon, epsilon = 1e-10);
        assert_relative_eq!(back.lat, point.lat, epsilon = 1e-10);
        assert_relative_eq!(back.hgt, point.hgt, epsilon = 1e-5);
    }

    #[test]
    fn test_base_to_enu_is_origin() {
        let c = Coord::geo(5.0, 44.0, 12.0);
        let enu = c.to_enu(None).unwrap();
        assert_relative_eq!(enu.norm(), 0.0, epsilon = 1e-6);
        assert!(matches!(enu, Coord::Enu(_)));
    }

    #[test]
    fn test_enu_without_base_fails() {
        let c = Coord::enu(1.0, 2.0, 3.0);
        assert!(c.to_geo(None).is_err());
        assert!(c.to_ecef(None).is_err());
    }

    #[test]
    fn test_planar_ops() {
        let c = Coord::enu(1.0, 0.0, 5.0);
        let r = c.rotate(std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(r.get_x(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.get_y(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(r.get_z(), 5.0);

        let s = c.scale(3.0).translate(1.0, 2.0, 0.0);
        assert_eq!(s, Coord::enu(4.0, 2.0, 5.0));

        let d = Coord::enu(3.0, 4.0, 0.0) - Coord::enu(0.0, 0.0, 0.0);
        assert_relative_eq!(d.norm(), 5.0);
        assert_relative_eq!(Coord::enu(0.0, 0.0, 0.0).distance_2d(&d), 5.0);
        assert_relative_eq!(Coord::enu(0.0, 0.0, 12.0).distance_3d(&Coord::enu(3.0, 4.0, 0.0)), 13.0);
    }

    #[test]
    fn test_haversine() {
        // one degree of latitude on the sphere
        let a = Coord::geo(0.0, 0.0, 0.0);
        let b = Coord::geo(0.0, 1.0, 0.0);
        assert_relative_eq!(a.distance_2d(&b), EARTH_RADIUS * RADEG, epsilon = 1e-6);
    }

    #[test]
    fn test_azimuth() {
        let o = Coord::enu(0.0, 0.0, 0.0);
        assert_relative_eq!(o.azimuth_to(&Coord::enu(0.0, 1.0, 0.0)), 0.0);
        assert_relative_eq!(
            o.azimuth_to(&Coord::enu(1.0, 0.0, 0.0)),
            std::f64::consts::FRAC_PI_2
        );
    }

    #[test]
    fn test_srid_parse() {
        assert_eq!("ENUCoords".parse::<Srid>().unwrap(), Srid::Enu);
        assert_eq!("geo".parse::<Srid>().unwrap(), Srid::Geo);
        assert_eq!("ECEF".parse::<Srid>().unwrap(), Srid::Ecef);
        assert_eq!("2154".parse::<Srid>().unwrap(), Srid::Proj(2154));
        assert_eq!("EPSG:32631".parse::<Srid>().unwrap(), Srid::Proj(32631));
        assert_eq!("4326".parse::<Srid>().unwrap(), Srid::Geo);
        assert!("32661".parse::<Srid>().is_err());
        assert_eq!(
            "LAMBERT".parse::<Srid>(),
            Err(TrackError::UnknownCoordCode("LAMBERT".into()))
        );
    }
}
