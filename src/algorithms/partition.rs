//! Optimal partition of an index range by dynamic programming.
//!
//! Given a cost matrix `C` where `C[i, j]` scores the segment between boundaries `i` and
//! `j` (`i < j`), the solver finds the set of boundaries `0 = c₀ < c₁ < … < c_m = n − 1`
//! optimising `Σ C[c_k, c_{k+1}]`:
//!
//! ```text
//! D[i, j] = opt( C[i, j], opt_{i<k<j} D[i, k] + D[k, j] )
//! ```
//!
//! Consecutive segments share their boundary. The table is filled by increasing span,
//! each cell storing a marker (`None` for a direct segment, `Some(k)` for a split), and
//! the cut list is rebuilt by walking the markers back from `(0, n − 1)`.
//!
//! Time is `O(n³)` and memory `O(n²)`.
use nalgebra::DMatrix;
use tracing::debug;

use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    Minimise,
    Maximise,
}

impl PartitionMode {
    fn better(&self, candidate: f64, current: f64) -> bool {
        match self {
            PartitionMode::Minimise => candidate < current,
            PartitionMode::Maximise => candidate > current,
        }
    }
}

/// Sorted boundary indices of the optimal partition, always including `0` and `n − 1`.
///
/// Only the upper triangle of `cost` is read. Equal scores are resolved towards the
/// partition with fewer segments, then the direct segment, then the smallest split index. A matrix smaller than 2×2 yields `[0]` (or nothing when empty).
pub fn optimal_partition(cost: &DMatrix<f64>, mode: PartitionMode) -> Vec<usize> {
    let n = cost.nrows().min(cost.ncols());
    match n {
        0 => return Vec::new(),
        1 => return vec![0],
        _ => {}
    }

    let mut best = DMatrix::<f64>::zeros(n, n);
    let mut segments = DMatrix::<usize>::zeros(n, n);
    let mut marker: Vec<Option<usize>> = vec![None; n * n];
    let mut progress = Progress::new("optimal partition", (n - 1) as u64);

    for span in 1..n {
        for i in 0..n - span {
            let j = i + span;
            let mut value = cost[(i, j)];
            let mut count = 1;
            let mut split = None;
            for k in i + 1..j {
                let v = best[(i, k)] + best[(k, j)];
                let m = segments[(i, k)] + segments[(k, j)];
                if mode.better(v, value) || (v == value && m < count) {
                    value = v;
                    count = m;
                    split = Some(k);
                }
            }
            best[(i, j)] = value;
            segments[(i, j)] = count;
            marker[i * n + j] = split;
        }
        progress.inc();
    }
    progress.finish();

    let mut cuts = vec![0, n - 1];
    let mut stack = vec![(0, n - 1)];
    while let Some((i, j)) = stack.pop() {
        if let Some(k) = marker[i * n + j] {
            cuts.push(k);
            stack.push((i, k));
            stack.push((k, j));
        }
    }
    cuts.sort_unstable();
    cuts.dedup();
    debug!(n, segments = cuts.len() - 1, total = best[(0, n - 1)], "optimal partition");
    cuts
}
