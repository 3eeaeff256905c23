use approx::assert_abs_diff_eq;
use geotrack::algorithms::geometry::{fit_circle, minimum_enclosing_circle, point_segment_distance, triangle_area};
use geotrack::algorithms::simplification::{douglas_peucker, visvalingam, SimplificationMode};
use geotrack::interpolation::{resample, InterpolationAlgo, InterpolationMode, InterpolationParams, ResampleDelta};

mod common;
use common::{enu_track, noisy_circle};

#[test]
fn circle_fit_on_noisy_samples() {
    let track = noisy_circle(200, 0.02, 12);
    let circle = fit_circle(track.positions()).unwrap();
    assert_abs_diff_eq!(circle.cx, 0.0, epsilon = 0.01);
    assert_abs_diff_eq!(circle.cy, 0.0, epsilon = 0.01);
    assert_abs_diff_eq!(circle.radius, 1.0, epsilon = 0.01);

    let mec = minimum_enclosing_circle(track.positions()).unwrap();
    assert!(mec.radius >= circle.radius);
    assert!(track.positions().iter().all(|p| mec.contains(p)));
}

#[test]
fn spatial_resample_keeps_steps_below_delta() {
    let track = noisy_circle(100, 0.0, 0);
    let ds = 0.05;
    let dense = resample(
        &track,
        ResampleDelta::Step(ds),
        InterpolationAlgo::Linear,
        InterpolationMode::Spatial,
        &InterpolationParams::default(),
    )
    .unwrap();
    let steps: Vec<f64> = dense.positions().windows(2).map(|w| w[0].distance_2d(&w[1])).collect();
    assert!(steps.iter().all(|d| *d <= ds + 1e-9));
    // resampled vertices lie on the polyline, corners are cut
    assert!(dense.length_2d() <= track.length_2d() + 1e-9);
    assert!(dense.length_2d() >= 0.99 * track.length_2d());
    assert!(dense.timestamps().windows(2).all(|w| w[0] < w[1]));
}

fn zigzag() -> geotrack::Track {
    let x: Vec<f64> = (0..60).map(|k| k as f64).collect();
    let y: Vec<f64> = (0..60)
        .map(|k| 4.0 * (k as f64 / 7.0).sin() + if k % 2 == 0 { 0.05 } else { -0.05 })
        .collect();
    let t: Vec<f64> = x.clone();
    enu_track(&x, &y, &t)
}

#[test]
fn douglas_peucker_tolerance_and_monotonicity() {
    let track = zigzag();
    let pts = track.positions();
    let mut previous = usize::MAX;
    for eps in [0.01, 0.1, 0.5, 1.0, 3.0] {
        let kept = douglas_peucker(pts, eps);
        assert!(kept.len() <= previous);
        previous = kept.len();
        for (k, p) in pts.iter().enumerate() {
            let d = kept
                .windows(2)
                .filter(|w| w[0] <= k && k <= w[1])
                .map(|w| point_segment_distance(p, &pts[w[0]], &pts[w[1]]))
                .fold(f64::INFINITY, f64::min);
            assert!(d <= eps + 1e-12);
        }
    }
    let simplified = track.simplify(&SimplificationMode::DouglasPeucker(0.5)).unwrap();
    assert_eq!(simplified.size(), douglas_peucker(pts, 0.5).len());
}

#[test]
fn visvalingam_survivors_exceed_threshold() {
    let track = zigzag();
    let pts = track.positions();
    let eps = 0.8;
    let kept = visvalingam(pts, eps);
    assert!(kept.len() < pts.len());
    assert_eq!(kept.first(), Some(&0));
    assert_eq!(kept.last(), Some(&(pts.len() - 1)));
    for w in kept.windows(3) {
        assert!(triangle_area(&pts[w[0]], &pts[w[1]], &pts[w[2]]) >= eps * eps);
    }
}
