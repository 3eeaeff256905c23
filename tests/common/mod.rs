#![allow(dead_code)]

use std::f64::consts::PI;

use geotrack::constants::EdgeId;
use geotrack::network::{Network, Orientation};
use geotrack::time::Timestamp;
use geotrack::{Coord, Srid, Track};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// ENU track from component arrays and timestamps in seconds.
pub fn enu_track(x: &[f64], y: &[f64], t: &[f64]) -> Track {
    let t: Vec<Timestamp> = t.iter().map(|s| Timestamp::from_unix_seconds(*s)).collect();
    Track::from_xyz(Srid::Enu, x, y, None, Some(&t)).unwrap()
}

/// `n` samples of the unit circle for `t ∈ [0, 1)`, with isotropic gaussian noise.
pub fn noisy_circle(n: usize, sigma: f64, seed: u64) -> Track {
    let mut rng = rng(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    let (mut x, mut y) = (Vec::with_capacity(n), Vec::with_capacity(n));
    for k in 0..n {
        let a = 2.0 * PI * k as f64 / n as f64;
        x.push(a.cos() + noise.sample(&mut rng));
        y.push(a.sin() + noise.sample(&mut rng));
    }
    let t: Vec<f64> = (0..n).map(|k| k as f64).collect();
    enu_track(&x, &y, &t)
}

/// 30 observations wandering inside a disc of diameter 3 over 87 s, then 70 observations
/// moving east at 2 m/s, starting 25 m away.
pub fn stop_then_move() -> Track {
    let (mut x, mut y, mut t) = (Vec::new(), Vec::new(), Vec::new());
    for k in 0..30 {
        let a = k as f64 * 2.4;
        x.push(1.5 * a.cos());
        y.push(1.5 * a.sin());
        t.push(3.0 * k as f64);
    }
    for k in 0..70 {
        x.push(25.0 + 6.0 * k as f64);
        y.push(0.0);
        t.push(87.0 + 12.5 + 3.0 * k as f64);
    }
    enu_track(&x, &y, &t)
}

/// Out along `y = 0` up to `x = 50` (observation 50), back along `y = 3`.
pub fn u_turn() -> Track {
    let x: Vec<f64> = (0..=100).map(|k| 50.0 - (50.0 - k as f64).abs()).collect();
    let y: Vec<f64> = (0..=100).map(|k| if k > 50 { 3.0 } else { 0.0 }).collect();
    let t: Vec<f64> = (0..=100).map(|k| k as f64).collect();
    enu_track(&x, &y, &t)
}

/// Six nodes, eight two-way straight edges.
pub fn grid_network() -> Network {
    let mut net = Network::new();
    for (id, x, y) in [
        (0, 0.0, 0.0),
        (1, 100.0, 0.0),
        (2, 200.0, 0.0),
        (3, 200.0, 100.0),
        (4, 100.0, 100.0),
        (5, 300.0, 150.0),
    ] {
        net.add_node(id, Coord::enu(x, y, 0.0));
    }
    let edges = [(0, 1), (1, 2), (2, 3), (1, 3), (1, 4), (4, 3), (3, 5), (2, 5)];
    for (id, (a, b)) in edges.into_iter().enumerate() {
        net.add_straight_edge(id as EdgeId, a, b, Orientation::Both).unwrap();
    }
    net
}

/// Constant velocity ground truth and its noisy observation.
pub fn constant_velocity(n: usize, sigma: f64, seed: u64) -> (Vec<(f64, f64)>, Track) {
    let mut rng = rng(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    let truth: Vec<(f64, f64)> = (0..n).map(|k| (1.5 * k as f64, 10.0 - 0.8 * k as f64)).collect();
    let x: Vec<f64> = truth.iter().map(|p| p.0 + noise.sample(&mut rng)).collect();
    let y: Vec<f64> = truth.iter().map(|p| p.1 + noise.sample(&mut rng)).collect();
    let t: Vec<f64> = (0..n).map(|k| k as f64).collect();
    (truth, enu_track(&x, &y, &t))
}

pub fn rmse(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(p, q)| (p.0 - q.0).powi(2) + (p.1 - q.1).powi(2))
        .sum();
    (sum / a.len() as f64).sqrt()
}
