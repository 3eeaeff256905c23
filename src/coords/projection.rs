//! Map projections selected by numeric SRID codes.
//!
//! * `2154` – RGF93 / Lambert-93 (Lambert conformal conic, two standard parallels, GRS80),
//! * `32601..=32660` – WGS84 / UTM zones 1–60 north,
//! * `32701..=32760` – WGS84 / UTM zones 1–60 south.
//!
//! Transverse Mercator formulas follow Snyder, *Map Projections: A Working Manual* (USGS 1987),
//! §8, which are accurate to the millimetre inside a zone.
use crate::constants::{Degree, DEGRAD, GRS80_E2, RADEG, WGS84_A, WGS84_E2};
use crate::coords::{EnuCoords, GeoCoords};
use crate::track_errors::TrackError;

const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Lambert93,
    Utm { zone: u8, north: bool },
}

/// Parameters of a Lambert conformal conic projection with two standard parallels.
#[derive(Debug, Clone, Copy)]
struct LambertConic {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
    lon0: f64,
    x0: f64,
    y0: f64,
}

impl LambertConic {
    fn lambert93() -> Self {
        LambertConic::new(
            GRS80_E2.sqrt(),
            3.0 * RADEG,
            46.5 * RADEG,
            44.0 * RADEG,
            49.0 * RADEG,
            700_000.0,
            6_600_000.0,
        )
    }

    fn new(e: f64, lon0: f64, lat0: f64, lat1: f64, lat2: f64, x0: f64, y0: f64) -> Self {
        let m = |phi: f64| phi.cos() / (1.0 - e * e * phi.sin().powi(2)).sqrt();
        let t = |phi: f64| {
            let es = e * phi.sin();
            (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
        };
        let (m1, m2) = (m(lat1), m(lat2));
        let (t0, t1, t2) = (t(lat0), t(lat1), t(lat2));
        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let f = m1 / (n * t1.powf(n));
        let af = WGS84_A * f;
        LambertConic {
            e,
            n,
            af,
            rho0: af * t0.powf(n),
            lon0,
            x0,
            y0,
        }
    }

    fn t(&self, phi: f64) -> f64 {
        let es = self.e * phi.sin();
        (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)
    }

    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = self.af * self.t(lat).powf(self.n);
        let theta = self.n * (lon - self.lon0);
        (
            self.x0 + rho * theta.sin(),
            self.y0 + self.rho0 - rho * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x0;
        let dy = self.rho0 - (y - self.y0);
        let rho = self.n.signum() * dx.hypot(dy);
        let t = (rho / self.af).powf(1.0 / self.n);
        let theta = dx.atan2(dy);
        let lon = theta / self.n + self.lon0;

        let mut lat = std::f64::consts::FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..20 {
            let es = self.e * lat.sin();
            let next = std::f64::consts::FRAC_PI_2
                - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            let converged = (next - lat).abs() < 1e-13;
            lat = next;
            if converged {
                break;
            }
        }
        (lon, lat)
    }
}

impl Projection {
    /// Resolve a numeric SRID code into a projection.
    pub fn from_srid(code: u32) -> Result<Self, TrackError> {
        match code {
            2154 => Ok(Projection::Lambert93),
            32601..=32660 => Ok(Projection::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Projection::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            _ => Err(TrackError::UnknownCoordCode(code.to_string())),
        }
    }

    /// Central meridian of a UTM zone, in degrees.
    fn utm_lon0(zone: u8) -> Degree {
        zone as f64 * 6.0 - 183.0
    }

    /// Project geographic coordinates to (easting, northing); the height is carried unchanged.
    pub fn forward(&self, geo: &GeoCoords) -> EnuCoords {
        let (x, y) = match *self {
            Projection::Lambert93 => LambertConic::lambert93().forward(geo.lon * RADEG, geo.lat * RADEG),
            Projection::Utm { zone, north } => {
                let (x, y) = tm_forward(geo.lon, geo.lat, Self::utm_lon0(zone));
                (x, if north { y } else { y + UTM_FALSE_NORTHING_SOUTH })
            }
        };
        EnuCoords::new(x, y, geo.hgt)
    }

    /// Inverse projection of (easting, northing) back to geographic coordinates.
    pub fn inverse(&self, enu: &EnuCoords) -> GeoCoords {
        match *self {
            Projection::Lambert93 => {
                let (lon, lat) = LambertConic::lambert93().inverse(enu.e, enu.n);
                GeoCoords::new(lon * DEGRAD, lat * DEGRAD, enu.u)
            }
            Projection::Utm { zone, north } => {
                let northing = if north {
                    enu.n
                } else {
                    enu.n - UTM_FALSE_NORTHING_SOUTH
                };
                let (lon, lat) = tm_inverse(enu.e, northing, Self::utm_lon0(zone));
                GeoCoords::new(lon, lat, enu.u)
            }
        }
    }
}

fn meridian_arc(phi: f64) -> f64 {
    let e2 = WGS84_E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Transverse Mercator forward (Snyder eqs. 8-9 to 8-10), false easting included.
fn tm_forward(lon: Degree, lat: Degree, lon0: Degree) -> (f64, f64) {
    let e2 = WGS84_E2;
    let ep2 = e2 / (1.0 - e2);
    let phi = lat * RADEG;
    let (sp, cp) = phi.sin_cos();
    let n = WGS84_A / (1.0 - e2 * sp * sp).sqrt();
    let t = (sp / cp).powi(2);
    let c = ep2 * cp * cp;
    let a = (lon - lon0) * RADEG * cp;
    let m = meridian_arc(phi);

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;
    let y = UTM_K0
        * (m + n
            * (sp / cp)
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    (x, y)
}

/// Transverse Mercator inverse (Snyder eqs. 8-12 to 8-18) using the footprint latitude.
fn tm_inverse(x: f64, y: f64, lon0: Degree) -> (Degree, Degree) {
    let e2 = WGS84_E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (s1, c1) = phi1.sin_cos();
    let cc = ep2 * c1 * c1;
    let t1 = (s1 / c1).powi(2);
    let n1 = WGS84_A / (1.0 - e2 * s1 * s1).sqrt();
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * s1 * s1).powf(1.5);
    let d = (x - UTM_FALSE_EASTING) / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * (s1 / c1) / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * cc - 4.0 * cc * cc - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * cc + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * cc * cc)
                    * d.powi(6)
                    / 720.0);
    let lambda = lon0 * RADEG
        + (d - (1.0 + 2.0 * t1 + cc) * d.powi(3) / 6.0
            + (5.0 - 2.0 * cc + 28.0 * t1 - 3.0 * cc * cc + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / c1;

    (lambda * DEGRAD, phi * DEGRAD)
}
