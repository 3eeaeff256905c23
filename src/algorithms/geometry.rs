//! Planar geometry helpers working on the `x`/`y` components of [`Coord`]s.
//!
//! * [`minimum_enclosing_circle`] – Welzl's algorithm (iterative move-to-front form),
//! * [`fit_circle`] – least squares circle (algebraic Kåsa start, Gauss–Newton refinement),
//! * [`principal_mbr`] – rectangle aligned on the principal axis of a point set,
//! * [`point_segment_distance`], [`triangle_area`].
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::constants::EPS;
use crate::coords::Coord;
use crate::track_errors::TrackError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

impl Circle {
    pub fn contains(&self, p: &Coord) -> bool {
        (p.get_x() - self.cx).hypot(p.get_y() - self.cy) <= self.radius * (1.0 + 1e-12) + EPS
    }
}

fn circle_two(a: &Coord, b: &Coord) -> Circle {
    let (cx, cy) = (0.5 * (a.get_x() + b.get_x()), 0.5 * (a.get_y() + b.get_y()));
    Circle {
        cx,
        cy,
        radius: 0.5 * (a.get_x() - b.get_x()).hypot(a.get_y() - b.get_y()),
    }
}

fn circle_three(a: &Coord, b: &Coord, c: &Coord) -> Circle {
    let (ax, ay) = (a.get_x(), a.get_y());
    let (bx, by) = (b.get_x() - ax, b.get_y() - ay);
    let (cx, cy) = (c.get_x() - ax, c.get_y() - ay);
    let d = 2.0 * (bx * cy - by * cx);
    if d.abs() < EPS {
        // collinear: the circle on the two farthest points
        let candidates = [circle_two(a, b), circle_two(a, c), circle_two(b, c)];
        return candidates
            .into_iter()
            .fold(candidates[0], |best, k| if k.radius > best.radius { k } else { best });
    }
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    Circle {
        cx: ax + ux,
        cy: ay + uy,
        radius: ux.hypot(uy),
    }
}

/// Smallest circle containing every point, `None` for an empty set.
pub fn minimum_enclosing_circle(points: &[Coord]) -> Option<Circle> {
    let first = points.first()?;
    let mut circle = Circle {
        cx: first.get_x(),
        cy: first.get_y(),
        radius: 0.0,
    };
    for i in 1..points.len() {
        if circle.contains(&points[i]) {
            continue;
        }
        circle = Circle {
            cx: points[i].get_x(),
            cy: points[i].get_y(),
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(&points[j]) {
                continue;
            }
            circle = circle_two(&points[i], &points[j]);
            for k in 0..j {
                if !circle.contains(&points[k]) {
                    circle = circle_three(&points[i], &points[j], &points[k]);
                }
            }
        }
    }
    Some(circle)
}

/// Least squares circle through `points`.
///
/// The algebraic fit `x² + y² + D x + E y + F = 0` gives the starting point, then
/// Gauss–Newton iterations minimise the geometric residuals `|pᵢ − c| − r`.
///
/// Errors
/// ----------
/// * `OutOfDomain` with fewer than three points.
/// * `SingularMatrix` for collinear points.
pub fn fit_circle(points: &[Coord]) -> Result<Circle, TrackError> {
    let n = points.len();
    if n < 3 {
        return Err(TrackError::OutOfDomain(format!(
            "circle fit needs at least 3 points, got {n}"
        )));
    }
    let a = DMatrix::from_fn(n, 3, |i, j| match j {
        0 => points[i].get_x(),
        1 => points[i].get_y(),
        _ => 1.0,
    });
    let b = DVector::from_iterator(n, points.iter().map(|p| -(p.get_x().powi(2) + p.get_y().powi(2))));
    let normal = a.transpose() * &a;
    let sol = normal
        .lu()
        .solve(&(a.transpose() * b))
        .ok_or_else(|| TrackError::singular("algebraic circle fit"))?;
    let (mut cx, mut cy) = (-0.5 * sol[0], -0.5 * sol[1]);
    let r2 = cx * cx + cy * cy - sol[2];
    if !(r2 > 0.0) || !r2.is_finite() {
        return Err(TrackError::singular("algebraic circle fit"));
    }
    let mut r = r2.sqrt();

    for _ in 0..50 {
        let mut jtj = Matrix3::zeros();
        let mut jtr = Vector3::zeros();
        for p in points {
            let (dx, dy) = (p.get_x() - cx, p.get_y() - cy);
            let d = dx.hypot(dy).max(EPS);
            let row = Vector3::new(-dx / d, -dy / d, -1.0);
            let res = d - r;
            jtj += row * row.transpose();
            jtr += row * res;
        }
        let Some(delta) = jtj.lu().solve(&(-jtr)) else {
            break;
        };
        cx += delta[0];
        cy += delta[1];
        r += delta[2];
        if delta.amax() < 1e-12 {
            break;
        }
    }
    Ok(Circle { cx, cy, radius: r.abs() })
}

/// Rectangle aligned on the principal axis of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mbr {
    /// Corners, counter-clockwise.
    pub corners: [(f64, f64); 4],
    /// Extent along the principal axis.
    pub length: f64,
    /// Extent across the principal axis.
    pub width: f64,
    /// Angle of the principal axis from the `x` axis, radians.
    pub orientation: f64,
}

pub fn principal_mbr(points: &[Coord]) -> Option<Mbr> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(Coord::get_x).sum::<f64>() / n;
    let my = points.iter().map(Coord::get_y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.get_x() - mx, p.get_y() - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (c, s) = (theta.cos(), theta.sin());

    let (mut umin, mut umax, mut vmin, mut vmax) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        let (dx, dy) = (p.get_x() - mx, p.get_y() - my);
        let u = c * dx + s * dy;
        let v = -s * dx + c * dy;
        umin = umin.min(u);
        umax = umax.max(u);
        vmin = vmin.min(v);
        vmax = vmax.max(v);
    }
    let corner = |u: f64, v: f64| (mx + c * u - s * v, my + s * u + c * v);
    let (du, dv) = (umax - umin, vmax - vmin);
    Some(Mbr {
        corners: [corner(umin, vmin), corner(umax, vmin), corner(umax, vmax), corner(umin, vmax)],
        length: du.max(dv),
        width: du.min(dv),
        orientation: if du >= dv { theta } else { theta + std::f64::consts::FRAC_PI_2 },
    })
}

/// Horizontal distance from `p` to the segment `[a, b]`.
pub fn point_segment_distance(p: &Coord, a: &Coord, b: &Coord) -> f64 {
    let (ax, ay) = (a.get_x(), a.get_y());
    let (dx, dy) = (b.get_x() - ax, b.get_y() - ay);
    let (px, py) = (p.get_x() - ax, p.get_y() - ay);
    let len2 = dx * dx + dy * dy;
    if len2 < EPS * EPS {
        return px.hypot(py);
    }
    let w = ((px * dx + py * dy) / len2).clamp(0.0, 1.0);
    (px - w * dx).hypot(py - w * dy)
}

/// Unsigned planar area of the triangle `abc`.
pub fn triangle_area(a: &Coord, b: &Coord, c: &Coord) -> f64 {
    0.5 * ((b.get_x() - a.get_x()) * (c.get_y() - a.get_y())
        - (c.get_x() - a.get_x()) * (b.get_y() - a.get_y()))
    .abs()
}

#[cfg(test)]
mod geometry_test {
    use super::*;
    use approx::assert_relative_eq;

    fn enu(x: f64, y: f64) -> Coord {
        Coord::enu(x, y, 0.0)
    }

    #[test]
    fn test_enclosing_circle() {
        let pts = [enu(0.0, 0.0), enu(2.0, 0.0), enu(1.0, 0.5), enu(1.0, -0.3)];
        let c = minimum_enclosing_circle(&pts).unwrap();
        assert_relative_eq!(c.cx, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.radius, 1.0, epsilon = 1e-12);

        let tri = [enu(0.0, 0.0), enu(4.0, 0.0), enu(2.0, 3.0)];
        let c = minimum_enclosing_circle(&tri).unwrap();
        for p in &tri {
            assert_relative_eq!((p.get_x() - c.cx).hypot(p.get_y() - c.cy), c.radius, epsilon = 1e-9);
        }
        assert!(minimum_enclosing_circle(&[]).is_none());
        assert_eq!(minimum_enclosing_circle(&[enu(3.0, 4.0)]).unwrap().radius, 0.0);
    }

    #[test]
    fn test_fit_circle_exact() {
        let pts: Vec<Coord> = (0..12)
            .map(|i| {
                let a = i as f64 * 0.5;
                enu(3.0 + 2.0 * a.cos(), -1.0 + 2.0 * a.sin())
            })
            .collect();
        let c = fit_circle(&pts).unwrap();
        assert_relative_eq!(c.cx, 3.0, epsilon = 1e-9);
        assert_relative_eq!(c.cy, -1.0, epsilon = 1e-9);
        assert_relative_eq!(c.radius, 2.0, epsilon = 1e-9);
        assert!(fit_circle(&pts[..2]).is_err());
        assert!(fit_circle(&[enu(0.0, 0.0), enu(1.0, 1.0), enu(2.0, 2.0)]).is_err());
    }

    #[test]
    fn test_mbr() {
        // 10 x 2 rectangle rotated by 30°
        let (c, s) = (30f64.to_radians().cos(), 30f64.to_radians().sin());
        let pts: Vec<Coord> = [(-5.0, -1.0), (5.0, -1.0), (5.0, 1.0), (-5.0, 1.0), (0.0, 0.0)]
            .iter()
            .map(|&(u, v)| enu(c * u - s * v, s * u + c * v))
            .collect();
        let m = principal_mbr(&pts).unwrap();
        assert_relative_eq!(m.length, 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.width, 2.0, epsilon = 1e-9);
        assert_relative_eq!(m.orientation.tan(), 30f64.to_radians().tan(), epsilon = 1e-9);
    }

    #[test]
    fn test_distances() {
        let (a, b) = (enu(0.0, 0.0), enu(10.0, 0.0));
        assert_relative_eq!(point_segment_distance(&enu(5.0, 3.0), &a, &b), 3.0);
        assert_relative_eq!(point_segment_distance(&enu(-3.0, 4.0), &a, &b), 5.0);
        assert_relative_eq!(point_segment_distance(&enu(1.0, 1.0), &a, &a), 2f64.sqrt());
        assert_relative_eq!(triangle_area(&a, &b, &enu(3.0, -4.0)), 20.0);
    }
}
