//! Piecewise linear interpolation along a monotone parameter.

/// Interpolate `values` (given at strictly increasing `sites`) at each of `targets`.
///
/// Targets outside `[sites[0], sites[n-1]]` are clamped to the end values.
/// Targets are usually sorted, in which case the bracketing pair is found by a forward walk;
/// otherwise a binary search is used.
pub fn interpolate(sites: &[f64], values: &[f64], targets: &[f64]) -> Vec<f64> {
    let n = sites.len().min(values.len());
    if n == 0 {
        return vec![f64::NAN; targets.len()];
    }
    if n == 1 {
        return vec![values[0]; targets.len()];
    }

    let mut cursor = 0usize;
    let mut previous = f64::NEG_INFINITY;
    targets
        .iter()
        .map(|&s| {
            if s <= sites[0] {
                return values[0];
            }
            if s >= sites[n - 1] {
                return values[n - 1];
            }
            if s < previous {
                cursor = sites[..n].partition_point(|&v| v <= s).saturating_sub(1);
            }
            previous = s;
            while cursor + 1 < n - 1 && sites[cursor + 1] <= s {
                cursor += 1;
            }
            let (s0, s1) = (sites[cursor], sites[cursor + 1]);
            let w = (s - s0) / (s1 - s0);
            (1.0 - w) * values[cursor] + w * values[cursor + 1]
        })
        .collect()
}
