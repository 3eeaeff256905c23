//! # Spatial index
//!
//! A regular `nrows × ncols` grid laid over the bounding box of a [`Network`] (items are
//! edge ids) or of a [`TrackCollection`] (items are track positions in the collection).
//! Each cell lists the items whose polyline crosses it, segment by segment.
//!
//! Cells are addressed as `(i, j)`, `i` counting columns along `x` and `j` rows along
//! `y`, both from the lower-left corner.
use std::collections::BTreeSet;

use tracing::debug;

use super::Network;
use crate::coords::Coord;
use crate::track::collection::TrackCollection;
use crate::track::{BoundingBox, Track};
use crate::track_errors::TrackError;

/// Grid cell address `(column, row)`.
pub type Cell = (usize, usize);

/// What to look up in a [`SpatialIndex`].
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    Cell(usize, usize),
    Coord(&'a Coord),
    Segment(&'a Coord, &'a Coord),
    Track(&'a Track),
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bbox: BoundingBox,
    nrows: usize,
    ncols: usize,
    dx: f64,
    dy: f64,
    /// Row-major: cell `(i, j)` is at `j * ncols + i`.
    cells: Vec<BTreeSet<u64>>,
}

impl SpatialIndex {
    fn empty(bbox: BoundingBox, (nrows, ncols): (usize, usize)) -> Result<Self, TrackError> {
        if nrows == 0 || ncols == 0 {
            return Err(TrackError::OutOfDomain(format!(
                "spatial index needs a non-empty grid, got {nrows}x{ncols}"
            )));
        }
        // flat boxes still get cells of positive size
        let step = |extent: f64, n: usize| if extent > 0.0 { extent / n as f64 } else { 1.0 };
        Ok(SpatialIndex {
            dx: step(bbox.width(), ncols),
            dy: step(bbox.height(), nrows),
            bbox,
            nrows,
            ncols,
            cells: vec![BTreeSet::new(); nrows * ncols],
        })
    }

    /// Index the edges of `network` by edge id.
    pub fn from_network(network: &Network, shape: (usize, usize)) -> Result<Self, TrackError> {
        let mut index = SpatialIndex::empty(network.bbox()?, shape)?;
        for edge in network.edges() {
            index.insert(edge.id, edge.geom.positions());
        }
        debug!(edges = network.edge_count(), rows = shape.0, cols = shape.1, "network indexed");
        Ok(index)
    }

    /// Index the tracks of `collection` by their position in it.
    pub fn from_collection(collection: &TrackCollection, shape: (usize, usize)) -> Result<Self, TrackError> {
        let mut index = SpatialIndex::empty(collection.bbox()?, shape)?;
        for (k, track) in collection.iter().enumerate() {
            index.insert(k as u64, track.positions());
        }
        debug!(tracks = collection.len(), rows = shape.0, cols = shape.1, "collection indexed");
        Ok(index)
    }

    fn insert(&mut self, id: u64, polyline: &[Coord]) {
        for cell in self.polyline_cells(polyline) {
            let k = self.slot(cell);
            self.cells[k].insert(id);
        }
    }

    fn slot(&self, (i, j): Cell) -> usize {
        j * self.ncols + i
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Cell containing `(x, y)`; points on the upper edge of the box belong to the last
    /// row or column.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<Cell> {
        if !self.bbox.contains_xy(x, y) {
            return None;
        }
        let i = (((x - self.bbox.xmin) / self.dx).floor() as usize).min(self.ncols - 1);
        let j = (((y - self.bbox.ymin) / self.dy).floor() as usize).min(self.nrows - 1);
        Some((i, j))
    }

    /// Lower-left and upper-right corners of a cell.
    fn cell_bounds(&self, (i, j): Cell) -> (f64, f64, f64, f64) {
        let x0 = self.bbox.xmin + i as f64 * self.dx;
        let y0 = self.bbox.ymin + j as f64 * self.dy;
        (x0, y0, x0 + self.dx, y0 + self.dy)
    }

    /// Cells touched by the segment `[a, b]`, tested against each cell of its bounding
    /// range.
    fn segment_cells(&self, a: &Coord, b: &Coord) -> Vec<Cell> {
        let (ax, ay, bx, by) = (a.get_x(), a.get_y(), b.get_x(), b.get_y());
        let clamp = |x: f64, y: f64| {
            let x = x.clamp(self.bbox.xmin, self.bbox.xmax);
            let y = y.clamp(self.bbox.ymin, self.bbox.ymax);
            self.cell_of(x, y)
        };
        let (Some((i0, j0)), Some((i1, j1))) = (clamp(ax.min(bx), ay.min(by)), clamp(ax.max(bx), ay.max(by)))
        else {
            return Vec::new();
        };
        // a cell boundary hit exactly also touches the previous cell
        let (i0, j0) = (i0.saturating_sub(1), j0.saturating_sub(1));
        let mut out = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                if segment_meets_rect((ax, ay), (bx, by), self.cell_bounds((i, j))) {
                    out.push((i, j));
                }
            }
        }
        out
    }

    fn polyline_cells(&self, polyline: &[Coord]) -> BTreeSet<Cell> {
        match polyline {
            [] => BTreeSet::new(),
            [p] => self.cell_of(p.get_x(), p.get_y()).into_iter().collect(),
            _ => polyline
                .windows(2)
                .flat_map(|w| self.segment_cells(&w[0], &w[1]))
                .collect(),
        }
    }

    /// Cells covered by a request.
    pub fn cells(&self, request: Request<'_>) -> BTreeSet<Cell> {
        match request {
            Request::Cell(i, j) if i < self.ncols && j < self.nrows => BTreeSet::from([(i, j)]),
            Request::Cell(..) => BTreeSet::new(),
            Request::Coord(c) => self.cell_of(c.get_x(), c.get_y()).into_iter().collect(),
            Request::Segment(a, b) => self.segment_cells(a, b).into_iter().collect(),
            Request::Track(t) => self.polyline_cells(t.positions()),
        }
    }

    /// Ids of the items registered in the cells covered by `request`.
    pub fn request(&self, request: Request<'_>) -> BTreeSet<u64> {
        self.cells(request)
            .into_iter()
            .flat_map(|cell| self.cells[self.slot(cell)].iter().copied())
            .collect()
    }

    /// Cells at Manhattan distance exactly `ring` from `(i, j)` that lie in the grid.
    pub fn neighbouring_cells(&self, i: usize, j: usize, ring: usize) -> Vec<Cell> {
        let (i, j, r) = (i as i64, j as i64, ring as i64);
        let inside = |(a, b): (i64, i64)| a >= 0 && b >= 0 && (a as usize) < self.ncols && (b as usize) < self.nrows;
        let mut out = Vec::new();
        for di in -r..=r {
            let dj = r - di.abs();
            let candidates = if dj == 0 { vec![(i + di, j)] } else { vec![(i + di, j - dj), (i + di, j + dj)] };
            out.extend(candidates.into_iter().filter(|c| inside(*c)).map(|(a, b)| (a as usize, b as usize)));
        }
        out
    }
}

/// Liang–Barsky clipping test, closed rectangle.
fn segment_meets_rect((ax, ay): (f64, f64), (bx, by): (f64, f64), (x0, y0, x1, y1): (f64, f64, f64, f64)) -> bool {
    let (dx, dy) = (bx - ax, by - ay);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, ax - x0), (dx, x1 - ax), (-dy, ay - y0), (dy, y1 - ay)] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return false;
            }
        }
    }
    true
}
