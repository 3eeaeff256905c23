//! # Tracks
//!
//! A [`Track`] is an ordered sequence of observations stored column-wise:
//! positions, timestamps and any number of named *analytical features* (one `f64` per
//! observation each). Every column always has exactly [`Track::size`] entries.
//!
//! All positions of a track share the coordinate variant selected by the track's
//! [`Srid`]. Conversions ([`Track::to_enu`], [`Track::to_geo`], [`Track::to_ecef`],
//! [`Track::to_proj`]) rewrite every position in place.
//!
//! Column names `x`, `y`, `z` and `t` are reserved: they always resolve to the position
//! components and to the timestamps (seconds since 1970-01-01), and cannot be created
//! as features.
//!
//! Submodules
//! -----------------
//! * [`query`] – `SELECT … WHERE …` predicate evaluator over columns,
//! * [`ops`] – arithmetic-style track operations (concatenation, split, decimation, …),
//! * [`collection`] – [`TrackCollection`](collection::TrackCollection),
//! * [`features`] – built-in analytical features (speed, heading, curvature, …).
pub mod collection;
pub mod features;
pub mod ops;
pub mod query;

use std::fmt;

use itertools::Itertools;

use crate::constants::{is_reserved_name, Meter, Radian, Second};
use crate::coords::projection::Projection;
use crate::coords::{Coord, GeoCoords, Srid};
use crate::observation::Observation;
use crate::time::Timestamp;
use crate::track_errors::TrackError;

/// Axis-aligned bounding box of a set of positions (semantic components).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
}

impl BoundingBox {
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        coords.into_iter().fold(None, |acc: Option<BoundingBox>, c| {
            let (x, y, z) = (c.get_x(), c.get_y(), c.get_z());
            Some(match acc {
                None => BoundingBox {
                    xmin: x,
                    xmax: x,
                    ymin: y,
                    ymax: y,
                    zmin: z,
                    zmax: z,
                },
                Some(b) => BoundingBox {
                    xmin: b.xmin.min(x),
                    xmax: b.xmax.max(x),
                    ymin: b.ymin.min(y),
                    ymax: b.ymax.max(y),
                    zmin: b.zmin.min(z),
                    zmax: b.zmax.max(z),
                },
            })
        })
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            xmin: self.xmin.min(other.xmin),
            xmax: self.xmax.max(other.xmax),
            ymin: self.ymin.min(other.ymin),
            ymax: self.ymax.max(other.ymax),
            zmin: self.zmin.min(other.zmin),
            zmax: self.zmax.max(other.zmax),
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

/// Statistic basis for [`Track::frequency`] and [`Track::interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Per second of elapsed time.
    Temporal,
    /// Per meter of travelled distance.
    Spatial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub uid: String,
    pub tid: String,
    srid: Srid,
    base: Option<GeoCoords>,
    positions: Vec<Coord>,
    timestamps: Vec<Timestamp>,
    af_names: Vec<String>,
    af_columns: Vec<Vec<f64>>,
}

/// Name of the coord variant that tracks of the given SRID store.
fn variant_of(srid: Srid) -> &'static str {
    match srid {
        Srid::Geo => "GEO",
        Srid::Ecef => "ECEF",
        Srid::Enu | Srid::Proj(_) => "ENU",
    }
}

impl Track {
    /// Empty track in the given frame.
    pub fn new(srid: Srid) -> Self {
        Track {
            uid: "0".to_string(),
            tid: "0".to_string(),
            srid,
            base: None,
            positions: Vec::new(),
            timestamps: Vec::new(),
            af_names: Vec::new(),
            af_columns: Vec::new(),
        }
    }

    /// Build a track from parallel position and timestamp vectors.
    pub fn from_parts(
        srid: Srid,
        positions: Vec<Coord>,
        timestamps: Vec<Timestamp>,
    ) -> Result<Self, TrackError> {
        if positions.len() != timestamps.len() {
            return Err(TrackError::mismatch(
                "positions / timestamps",
                positions.len(),
                timestamps.len(),
            ));
        }
        let mut track = Track::new(srid);
        for c in &positions {
            track.check_coord(c)?;
        }
        track.positions = positions;
        track.timestamps = timestamps;
        Ok(track)
    }

    /// Build a track from a list of observations. The SRID is taken from the first
    /// observation (ENU when empty); every observation must carry the same number of
    /// features, which become columns `af_0`, `af_1`, …
    pub fn from_observations(observations: Vec<Observation>) -> Result<Self, TrackError> {
        let srid = match observations.first().map(|o| o.position) {
            Some(Coord::Geo(_)) => Srid::Geo,
            Some(Coord::Ecef(_)) => Srid::Ecef,
            _ => Srid::Enu,
        };
        let width = observations.first().map_or(0, |o| o.features.len());
        let mut track = Track::new(srid);
        for k in 0..width {
            track.af_names.push(format!("af_{k}"));
            track.af_columns.push(Vec::with_capacity(observations.len()));
        }
        for obs in observations {
            track.add_obs(obs)?;
        }
        Ok(track)
    }

    /// Construction boundary used by readers: raw component arrays with a declared frame.
    ///
    /// Arguments
    /// -----------------
    /// * `x`, `y` – first and second components (lon/lat, e/n or x/y depending on `srid`).
    /// * `z` – third component, `0` when absent.
    /// * `t` – timestamps; when absent observations are 1 s apart from the Unix epoch.
    pub fn from_xyz(
        srid: Srid,
        x: &[f64],
        y: &[f64],
        z: Option<&[f64]>,
        t: Option<&[Timestamp]>,
    ) -> Result<Self, TrackError> {
        if x.len() != y.len() {
            return Err(TrackError::mismatch("x / y", x.len(), y.len()));
        }
        if let Some(z) = z {
            if z.len() != x.len() {
                return Err(TrackError::mismatch("x / z", x.len(), z.len()));
            }
        }
        if let Some(t) = t {
            if t.len() != x.len() {
                return Err(TrackError::mismatch("x / t", x.len(), t.len()));
            }
        }
        let positions = (0..x.len())
            .map(|i| Coord::from_xyz(srid, x[i], y[i], z.map_or(0.0, |z| z[i])))
            .collect();
        let timestamps = match t {
            Some(t) => t.to_vec(),
            None => (0..x.len())
                .map(|i| Timestamp::from_unix_seconds(i as f64))
                .collect(),
        };
        Track::from_parts(srid, positions, timestamps)
    }

    pub fn with_ids(mut self, uid: impl Into<String>, tid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self.tid = tid.into();
        self
    }

    /// Empty track sharing this track's ids, frame and base (but no feature columns).
    pub fn empty_like(&self) -> Track {
        Track {
            uid: self.uid.clone(),
            tid: self.tid.clone(),
            srid: self.srid,
            base: self.base,
            positions: Vec::new(),
            timestamps: Vec::new(),
            af_names: Vec::new(),
            af_columns: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Access
    // ---------------------------------------------------------------------------------------------

    pub fn size(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn srid(&self) -> Srid {
        self.srid
    }

    pub fn base(&self) -> Option<GeoCoords> {
        self.base
    }

    pub fn set_base(&mut self, base: Option<GeoCoords>) {
        self.base = base;
    }

    pub fn positions(&self) -> &[Coord] {
        &self.positions
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn feature_names(&self) -> &[String] {
        &self.af_names
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.af_names.iter().any(|n| n == name)
    }

    fn feature_index(&self, name: &str) -> Result<usize, TrackError> {
        self.af_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TrackError::MissingFeature(name.to_string()))
    }

    fn check_index(&self, index: usize) -> Result<(), TrackError> {
        if index >= self.size() {
            return Err(TrackError::IndexOutOfRange {
                index,
                len: self.size(),
            });
        }
        Ok(())
    }

    fn check_coord(&self, coord: &Coord) -> Result<(), TrackError> {
        let expected = variant_of(self.srid);
        if coord.kind() != expected {
            return Err(TrackError::wrong_srid(expected, coord.kind()));
        }
        Ok(())
    }

    /// Fails unless the track lives in a euclidean frame (ENU or a projection).
    pub fn require_euclidean(&self, what: &str) -> Result<(), TrackError> {
        if !self.srid.is_euclidean() {
            return Err(TrackError::WrongCoordSystem {
                expected: format!("ENU ({what})"),
                found: self.srid.to_string(),
            });
        }
        Ok(())
    }

    /// Observation `i`, with its feature vector ordered like [`Track::feature_names`].
    pub fn obs(&self, index: usize) -> Result<Observation, TrackError> {
        self.check_index(index)?;
        Ok(Observation::with_features(
            self.positions[index],
            self.timestamps[index],
            self.af_columns.iter().map(|col| col[index]).collect(),
        ))
    }

    pub fn first(&self) -> Option<Observation> {
        self.obs(0).ok()
    }

    pub fn last(&self) -> Option<Observation> {
        self.size().checked_sub(1).and_then(|i| self.obs(i).ok())
    }

    pub fn position(&self, index: usize) -> Result<Coord, TrackError> {
        self.check_index(index)?;
        Ok(self.positions[index])
    }

    pub fn timestamp(&self, index: usize) -> Result<Timestamp, TrackError> {
        self.check_index(index)?;
        Ok(self.timestamps[index])
    }

    pub fn set_position(&mut self, index: usize, coord: Coord) -> Result<(), TrackError> {
        self.check_index(index)?;
        self.check_coord(&coord)?;
        self.positions[index] = coord;
        Ok(())
    }

    pub fn set_timestamp(&mut self, index: usize, timestamp: Timestamp) -> Result<(), TrackError> {
        self.check_index(index)?;
        self.timestamps[index] = timestamp;
        Ok(())
    }

    /// Values of a column: `x`, `y`, `z`, `t` (Unix seconds) or an analytical feature.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, TrackError> {
        match name {
            "x" => Ok(self.positions.iter().map(Coord::get_x).collect()),
            "y" => Ok(self.positions.iter().map(Coord::get_y).collect()),
            "z" => Ok(self.positions.iter().map(Coord::get_z).collect()),
            "t" => Ok(self.timestamps.iter().map(Timestamp::unix_seconds).collect()),
            _ => Ok(self.feature(name)?.to_vec()),
        }
    }

    /// Overwrite a column. Writing `x`, `y` or `z` moves the positions; `t` rewrites timestamps.
    pub fn set_column(&mut self, name: &str, values: &[f64]) -> Result<(), TrackError> {
        if values.len() != self.size() {
            return Err(TrackError::mismatch(name, self.size(), values.len()));
        }
        match name {
            "x" => self
                .positions
                .iter_mut()
                .zip(values)
                .for_each(|(c, v)| *c = c.with_x(*v)),
            "y" => self
                .positions
                .iter_mut()
                .zip(values)
                .for_each(|(c, v)| *c = c.with_y(*v)),
            "z" => self
                .positions
                .iter_mut()
                .zip(values)
                .for_each(|(c, v)| *c = c.with_z(*v)),
            "t" => self
                .timestamps
                .iter_mut()
                .zip(values)
                .for_each(|(t, v)| *t = Timestamp::from_unix_seconds(*v)),
            _ => {
                let k = self.feature_index(name)?;
                self.af_columns[k].copy_from_slice(values);
            }
        }
        Ok(())
    }

    pub fn feature(&self, name: &str) -> Result<&[f64], TrackError> {
        let k = self.feature_index(name)?;
        Ok(&self.af_columns[k])
    }

    pub fn feature_value(&self, name: &str, index: usize) -> Result<f64, TrackError> {
        self.check_index(index)?;
        Ok(self.feature(name)?[index])
    }

    pub fn set_feature_value(&mut self, name: &str, index: usize, value: f64) -> Result<(), TrackError> {
        self.check_index(index)?;
        let k = self.feature_index(name)?;
        self.af_columns[k][index] = value;
        Ok(())
    }

    /// Seconds elapsed since the first observation, for every observation.
    pub fn relative_times(&self) -> Vec<Second> {
        match self.timestamps.first() {
            Some(&t0) => self.timestamps.iter().map(|&t| t - t0).collect(),
            None => Vec::new(),
        }
    }

    /// Cumulative horizontal distance from the first observation.
    pub fn curvilinear_abscissa(&self) -> Vec<Meter> {
        let mut s = Vec::with_capacity(self.size());
        let mut acc = 0.0;
        for (i, c) in self.positions.iter().enumerate() {
            if i > 0 {
                acc += self.positions[i - 1].distance_2d(c);
            }
            s.push(acc);
        }
        s
    }

    pub fn bbox(&self) -> Result<BoundingBox, TrackError> {
        BoundingBox::from_coords(&self.positions).ok_or_else(|| TrackError::EmptyTrack("bbox".into()))
    }

    /// Arithmetic mean of the positions (semantic components, same variant as the track).
    pub fn centroid(&self) -> Result<Coord, TrackError> {
        if self.is_empty() {
            return Err(TrackError::EmptyTrack("centroid".into()));
        }
        let n = self.size() as f64;
        let (sx, sy, sz) = self.positions.iter().fold((0.0, 0.0, 0.0), |(x, y, z), c| {
            (x + c.get_x(), y + c.get_y(), z + c.get_z())
        });
        Ok(self.positions[0].with_xyz(sx / n, sy / n, sz / n))
    }

    /// `true` when timestamps are non-decreasing.
    pub fn is_sorted(&self) -> bool {
        self.timestamps.windows(2).all(|w| w[0] <= w[1])
    }

    // ---------------------------------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------------------------------

    /// Append an observation. Its features must match the track's columns in number,
    /// or be empty (all features are then NaN).
    pub fn add_obs(&mut self, obs: Observation) -> Result<(), TrackError> {
        let at = self.size();
        self.insert_at(obs, at)
    }

    /// Insert an observation at `index`, or at its chronological position when `None`
    /// (after every observation with the same timestamp).
    pub fn insert_obs(&mut self, obs: Observation, index: Option<usize>) -> Result<(), TrackError> {
        let at = match index {
            Some(i) if i > self.size() => {
                return Err(TrackError::IndexOutOfRange {
                    index: i,
                    len: self.size(),
                })
            }
            Some(i) => i,
            None => self.timestamps.partition_point(|t| *t <= obs.timestamp),
        };
        self.insert_at(obs, at)
    }

    fn insert_at(&mut self, obs: Observation, at: usize) -> Result<(), TrackError> {
        self.check_coord(&obs.position)?;
        let width = self.af_names.len();
        if !obs.features.is_empty() && obs.features.len() != width {
            return Err(TrackError::mismatch("observation features", width, obs.features.len()));
        }
        self.positions.insert(at, obs.position);
        self.timestamps.insert(at, obs.timestamp);
        for (k, col) in self.af_columns.iter_mut().enumerate() {
            col.insert(at, obs.features.get(k).copied().unwrap_or(f64::NAN));
        }
        Ok(())
    }

    pub fn set_obs(&mut self, index: usize, obs: Observation) -> Result<(), TrackError> {
        self.check_index(index)?;
        self.check_coord(&obs.position)?;
        if !obs.features.is_empty() && obs.features.len() != self.af_names.len() {
            return Err(TrackError::mismatch(
                "observation features",
                self.af_names.len(),
                obs.features.len(),
            ));
        }
        self.positions[index] = obs.position;
        self.timestamps[index] = obs.timestamp;
        for (k, col) in self.af_columns.iter_mut().enumerate() {
            col[index] = obs.features.get(k).copied().unwrap_or(f64::NAN);
        }
        Ok(())
    }

    pub fn remove_obs(&mut self, index: usize) -> Result<Observation, TrackError> {
        let obs = self.obs(index)?;
        self.positions.remove(index);
        self.timestamps.remove(index);
        for col in self.af_columns.iter_mut() {
            col.remove(index);
        }
        Ok(obs)
    }

    /// Remove several observations at once. Indices may be given in any order;
    /// duplicates are ignored.
    pub fn remove_obs_many(&mut self, indices: &[usize]) -> Result<(), TrackError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.size()) {
            return Err(TrackError::IndexOutOfRange {
                index: bad,
                len: self.size(),
            });
        }
        let mut drop = vec![false; self.size()];
        indices.iter().for_each(|&i| drop[i] = true);
        let keep: Vec<usize> = (0..self.size()).filter(|&i| !drop[i]).collect();
        self.retain_indices(&keep);
        Ok(())
    }

    /// Remove every observation stamped `timestamp`; returns how many were removed.
    pub fn remove_obs_at(&mut self, timestamp: &Timestamp) -> usize {
        self.remove_obs_at_times(std::slice::from_ref(timestamp))
    }

    pub fn remove_obs_at_times(&mut self, timestamps: &[Timestamp]) -> usize {
        let keep: Vec<usize> = (0..self.size())
            .filter(|&i| !timestamps.contains(&self.timestamps[i]))
            .collect();
        let removed = self.size() - keep.len();
        self.retain_indices(&keep);
        removed
    }

    /// Keep only the observations at `indices`, in that order.
    pub(crate) fn retain_indices(&mut self, indices: &[usize]) {
        self.positions = indices.iter().map(|&i| self.positions[i]).collect();
        self.timestamps = indices.iter().map(|&i| self.timestamps[i]).collect();
        for col in self.af_columns.iter_mut() {
            *col = indices.iter().map(|&i| col[i]).collect();
        }
    }

    /// Copy of the observations at `indices` (features included).
    pub fn select(&self, indices: &[usize]) -> Result<Track, TrackError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.size()) {
            return Err(TrackError::IndexOutOfRange {
                index: bad,
                len: self.size(),
            });
        }
        let mut out = self.clone();
        out.retain_indices(indices);
        Ok(out)
    }

    /// Contiguous copy of observations `[start, end)`, clamped to the track.
    pub fn extract(&self, start: usize, end: usize) -> Track {
        let end = end.min(self.size());
        let start = start.min(end);
        let indices: Vec<usize> = (start..end).collect();
        let mut out = self.clone();
        out.retain_indices(&indices);
        out
    }

    /// Stable chronological sort.
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.size()).collect();
        order.sort_by(|&a, &b| self.timestamps[a].cmp(&self.timestamps[b]));
        self.retain_indices(&order);
    }

    /// Stable least-significant-digit radix sort on calendar fields
    /// (milliseconds first, year last).
    pub fn sort_radix(&mut self) {
        if self.size() < 2 {
            return;
        }
        let fields: Vec<_> = self.timestamps.iter().map(Timestamp::fields).collect();
        let ymin = fields.iter().map(|f| f.year).min().unwrap_or(0);
        let keys: [Box<dyn Fn(usize) -> usize + '_>; 7] = [
            Box::new(|i| fields[i].millis as usize),
            Box::new(|i| fields[i].second as usize),
            Box::new(|i| fields[i].minute as usize),
            Box::new(|i| fields[i].hour as usize),
            Box::new(|i| fields[i].day as usize),
            Box::new(|i| fields[i].month as usize),
            Box::new(|i| (fields[i].year - ymin) as usize),
        ];

        let mut order: Vec<usize> = (0..self.size()).collect();
        for key in keys.iter() {
            let buckets = order.iter().map(|&i| key(i)).max().unwrap_or(0) + 1;
            let mut counts = vec![0usize; buckets + 1];
            for &i in &order {
                counts[key(i) + 1] += 1;
            }
            for b in 1..=buckets {
                counts[b] += counts[b - 1];
            }
            let mut next = vec![0usize; order.len()];
            for &i in &order {
                let k = key(i);
                next[counts[k]] = i;
                counts[k] += 1;
            }
            order = next;
        }
        self.retain_indices(&order);
    }

    // ---------------------------------------------------------------------------------------------
    // Analytical features
    // ---------------------------------------------------------------------------------------------

    fn check_new_name(&self, name: &str) -> Result<(), TrackError> {
        if is_reserved_name(name) {
            return Err(TrackError::ReservedFeatureName(name.to_string()));
        }
        Ok(())
    }

    /// Create a feature column initialised to `init`.
    ///
    /// Fails on reserved names and on names already in use.
    pub fn create_feature(&mut self, name: &str, init: f64) -> Result<(), TrackError> {
        self.check_new_name(name)?;
        if self.has_feature(name) {
            return Err(TrackError::DuplicateFeature(name.to_string()));
        }
        self.af_names.push(name.to_string());
        self.af_columns.push(vec![init; self.size()]);
        Ok(())
    }

    /// Store `values` as column `name`, replacing any existing column of that name.
    pub fn add_feature_values(&mut self, name: &str, values: Vec<f64>) -> Result<(), TrackError> {
        self.check_new_name(name)?;
        if values.len() != self.size() {
            return Err(TrackError::mismatch(name, self.size(), values.len()));
        }
        match self.af_names.iter().position(|n| n == name) {
            Some(k) => self.af_columns[k] = values,
            None => {
                self.af_names.push(name.to_string());
                self.af_columns.push(values);
            }
        }
        Ok(())
    }

    /// Evaluate `f(track, i)` on every observation and store the result as column `name`
    /// (replacing an existing column). A failing evaluation stores `NaN` in that cell.
    pub fn add_feature<F>(&mut self, name: &str, f: F) -> Result<(), TrackError>
    where
        F: Fn(&Track, usize) -> Result<f64, TrackError>,
    {
        self.check_new_name(name)?;
        let values = (0..self.size())
            .map(|i| f(self, i).unwrap_or(f64::NAN))
            .collect();
        self.add_feature_values(name, values)
    }

    /// Drop column `name`; later columns shift down by one.
    pub fn remove_feature(&mut self, name: &str) -> Result<Vec<f64>, TrackError> {
        let k = self.feature_index(name)?;
        self.af_names.remove(k);
        Ok(self.af_columns.remove(k))
    }

    pub fn clear_features(&mut self) {
        self.af_names.clear();
        self.af_columns.clear();
    }

    // ---------------------------------------------------------------------------------------------
    // Coordinate conversions
    // ---------------------------------------------------------------------------------------------

    fn geo_positions(&self, base: Option<&GeoCoords>) -> Result<Vec<GeoCoords>, TrackError> {
        let base = base.or(self.base.as_ref());
        self.positions
            .iter()
            .map(|c| match (self.srid, c) {
                (Srid::Proj(code), Coord::Enu(e)) => Ok(Projection::from_srid(code)?.inverse(e)),
                _ => match c.to_geo(base)? {
                    Coord::Geo(g) => Ok(g),
                    other => Err(TrackError::wrong_srid("GEO", other.kind())),
                },
            })
            .collect()
    }

    /// Convert every position to the ENU frame tangent at `base`.
    ///
    /// Without `base` the track's recorded base is used, or else its first position,
    /// which then becomes the recorded base. An ENU track given a new base is re-expressed
    /// relative to it.
    pub fn to_enu(&mut self, base: Option<GeoCoords>) -> Result<(), TrackError> {
        if self.srid == Srid::Enu {
            if let (Some(new), Some(old)) = (base, self.base) {
                if new != old {
                    let geo = self.geo_positions(Some(&old))?;
                    self.positions = geo.iter().map(|g| Coord::Enu(g.to_enu(&new))).collect();
                }
            }
            if base.is_some() {
                self.base = base;
            }
            return Ok(());
        }
        let geo = self.geo_positions(None)?;
        let base = match base.or(self.base).or_else(|| geo.first().copied()) {
            Some(b) => b,
            None => {
                self.srid = Srid::Enu;
                return Ok(());
            }
        };
        self.positions = geo.iter().map(|g| Coord::Enu(g.to_enu(&base))).collect();
        self.base = Some(base);
        self.srid = Srid::Enu;
        Ok(())
    }

    /// Convert every position to geographic coordinates. ENU tracks need a base
    /// (argument or recorded).
    pub fn to_geo(&mut self, base: Option<GeoCoords>) -> Result<(), TrackError> {
        let geo = self.geo_positions(base.as_ref())?;
        self.positions = geo.into_iter().map(Coord::Geo).collect();
        if base.is_some() {
            self.base = base;
        }
        self.srid = Srid::Geo;
        Ok(())
    }

    pub fn to_ecef(&mut self, base: Option<GeoCoords>) -> Result<(), TrackError> {
        let geo = self.geo_positions(base.as_ref())?;
        self.positions = geo.iter().map(|g| Coord::Ecef(g.to_ecef())).collect();
        if base.is_some() {
            self.base = base;
        }
        self.srid = Srid::Ecef;
        Ok(())
    }

    /// Project every position with the map projection selected by `code` (e.g. 2154).
    pub fn to_proj(&mut self, code: u32) -> Result<(), TrackError> {
        let projection = Projection::from_srid(code)?;
        let geo = self.geo_positions(None)?;
        self.positions = geo
            .iter()
            .map(|g| Coord::Enu(projection.forward(g)))
            .collect();
        self.srid = Srid::Proj(code);
        Ok(())
    }

    /// Convert to any frame. `Srid::Enu` uses the recorded base (or the first position).
    pub fn to_srid(&mut self, srid: Srid) -> Result<(), TrackError> {
        match srid {
            Srid::Geo => self.to_geo(None),
            Srid::Enu => self.to_enu(None),
            Srid::Ecef => self.to_ecef(None),
            Srid::Proj(code) => self.to_proj(code),
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Affine transforms (euclidean frames only)
    // ---------------------------------------------------------------------------------------------

    pub fn rotate(&mut self, theta: Radian) -> Result<(), TrackError> {
        self.require_euclidean("rotate")?;
        self.positions.iter_mut().for_each(|c| *c = c.rotate(theta));
        Ok(())
    }

    pub fn scale(&mut self, k: f64) -> Result<(), TrackError> {
        self.require_euclidean("scale")?;
        self.positions.iter_mut().for_each(|c| *c = c.scale(k));
        Ok(())
    }

    pub fn translate(&mut self, tx: f64, ty: f64, tz: f64) -> Result<(), TrackError> {
        self.require_euclidean("translate")?;
        self.positions
            .iter_mut()
            .for_each(|c| *c = c.translate(tx, ty, tz));
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // Derived quantities
    // ---------------------------------------------------------------------------------------------

    /// Sum of consecutive 3D distances.
    pub fn length(&self) -> Meter {
        self.positions
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.distance_3d(b))
            .sum()
    }

    /// Sum of consecutive horizontal distances.
    pub fn length_2d(&self) -> Meter {
        self.positions
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.distance_2d(b))
            .sum()
    }

    pub fn duration(&self) -> Second {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(&a), Some(&b)) => b - a,
            _ => 0.0,
        }
    }

    /// Mean sampling rate: observations per second (temporal) or per meter (spatial).
    pub fn frequency(&self, mode: SamplingMode) -> Result<f64, TrackError> {
        Ok(1.0 / self.interval(mode)?)
    }

    /// Mean sampling step: seconds (temporal) or meters (spatial) between observations.
    pub fn interval(&self, mode: SamplingMode) -> Result<f64, TrackError> {
        if self.size() < 2 {
            return Err(TrackError::EmptyTrack("interval (needs 2 observations)".into()));
        }
        let span = match mode {
            SamplingMode::Temporal => self.duration(),
            SamplingMode::Spatial => self.length_2d(),
        };
        Ok(span / (self.size() - 1) as f64)
    }

    fn check_range(&self, i: usize, j: usize) -> Result<(), TrackError> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i > j {
            return Err(TrackError::OutOfDomain(format!("empty range {i}..={j}")));
        }
        Ok(())
    }

    /// Height difference between observations `j` and `i` (inclusive range).
    pub fn net_deniv(&self, i: usize, j: usize) -> Result<Meter, TrackError> {
        self.check_range(i, j)?;
        Ok(self.positions[j].get_z() - self.positions[i].get_z())
    }

    /// Cumulative positive height gain over `[i, j]`.
    pub fn asc_deniv(&self, i: usize, j: usize) -> Result<Meter, TrackError> {
        self.check_range(i, j)?;
        Ok(self.positions[i..=j]
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b.get_z() - a.get_z()).max(0.0))
            .sum())
    }

    /// Cumulative height loss over `[i, j]`, as a non-positive number
    /// (so that `net = asc + desc`).
    pub fn desc_deniv(&self, i: usize, j: usize) -> Result<Meter, TrackError> {
        self.check_range(i, j)?;
        Ok(self.positions[i..=j]
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b.get_z() - a.get_z()).min(0.0))
            .sum())
    }

    /// Printable overview of the track.
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            uid: self.uid.clone(),
            tid: self.tid.clone(),
            srid: self.srid,
            size: self.size(),
            first: self.timestamps.first().copied(),
            last: self.timestamps.last().copied(),
            duration: self.duration(),
            length: self.length(),
            bbox: self.bbox().ok(),
            features: self.af_names.clone(),
        }
    }
}

/// Overview returned by [`Track::summary`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub uid: String,
    pub tid: String,
    pub srid: Srid,
    pub size: usize,
    pub first: Option<Timestamp>,
    pub last: Option<Timestamp>,
    pub duration: Second,
    pub length: Meter,
    pub bbox: Option<BoundingBox>,
    pub features: Vec<String>,
}

impl fmt::Display for TrackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Track {} (user {}) in {}", self.tid, self.uid, self.srid)?;
        writeln!(f, "  observations : {}", self.size)?;
        if let (Some(a), Some(b)) = (self.first, self.last) {
            writeln!(f, "  from {a} to {b} ({:.3} s)", self.duration)?;
        }
        writeln!(f, "  length       : {:.3} m", self.length)?;
        if let Some(b) = self.bbox {
            writeln!(
                f,
                "  bbox         : [{:.3}, {:.3}] x [{:.3}, {:.3}]",
                b.xmin, b.xmax, b.ymin, b.ymax
            )?;
        }
        if self.features.is_empty() {
            write!(f, "  features     : none")
        } else {
            write!(f, "  features     : {}", self.features.join(", "))
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod track_test {
    use super::*;
    use approx::assert_relative_eq;

    fn line(n: usize) -> Track {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = vec![0.0; n];
        Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap()
    }

    #[test]
    fn test_from_xyz_and_access() {
        let t = line(5);
        assert_eq!(t.size(), 5);
        assert_eq!(t.first().unwrap().position, Coord::enu(0.0, 0.0, 0.0));
        assert_eq!(t.last().unwrap().position, Coord::enu(4.0, 0.0, 0.0));
        assert_eq!(t.column("x").unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_relative_eq!(t.duration(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(t.length(), 4.0);
        assert_eq!(t.centroid().unwrap(), Coord::enu(2.0, 0.0, 0.0));
        assert!(matches!(
            t.obs(5),
            Err(TrackError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_wrong_variant_rejected() {
        let mut t = line(2);
        let obs = Observation::new(Coord::geo(1.0, 2.0, 0.0), Timestamp::from_unix_seconds(9.0));
        assert_eq!(
            t.add_obs(obs),
            Err(TrackError::wrong_srid("ENU", "GEO"))
        );
    }

    #[test]
    fn test_features_lifecycle() {
        let mut t = line(4);
        t.create_feature("speed", 1.0).unwrap();
        t.create_feature("w", 0.0).unwrap();
        assert_eq!(
            t.create_feature("x", 0.0),
            Err(TrackError::ReservedFeatureName("x".into()))
        );
        assert_eq!(
            t.create_feature("w", 0.0),
            Err(TrackError::DuplicateFeature("w".into()))
        );

        t.add_feature("double", |tr, i| Ok(2.0 * tr.position(i)?.get_x()))
            .unwrap();
        assert_eq!(t.feature("double").unwrap(), &[0.0, 2.0, 4.0, 6.0]);

        t.add_feature("fails", |_, i| {
            if i == 2 {
                Err(TrackError::OutOfDomain("boom".into()))
            } else {
                Ok(1.0)
            }
        })
        .unwrap();
        assert!(t.feature("fails").unwrap()[2].is_nan());

        t.remove_feature("speed").unwrap();
        assert_eq!(t.feature_names(), &["w", "double", "fails"]);
        assert_eq!(t.obs(1).unwrap().features.len(), 3);

        // appended observations without features get NaN in every column
        t.add_obs(Observation::new(Coord::enu(9.0, 0.0, 0.0), Timestamp::from_unix_seconds(10.0)))
            .unwrap();
        assert!(t.feature("w").unwrap()[4].is_nan());
    }

    #[test]
    fn test_insert_chronological_and_remove() {
        let mut t = line(4);
        let obs = Observation::new(Coord::enu(1.5, 0.0, 0.0), Timestamp::from_unix_seconds(1.5));
        t.insert_obs(obs, None).unwrap();
        assert_eq!(t.column("x").unwrap(), vec![0.0, 1.0, 1.5, 2.0, 3.0]);

        t.remove_obs_many(&[4, 0, 4]).unwrap();
        assert_eq!(t.column("x").unwrap(), vec![1.0, 1.5, 2.0]);

        let removed = t.remove_obs_at(&Timestamp::from_unix_seconds(2.0));
        assert_eq!(removed, 1);
        assert_eq!(t.column("x").unwrap(), vec![1.0, 1.5]);
    }

    #[test]
    fn test_sorts() {
        let times: Vec<Timestamp> = [5.0, 1.0, 3.0, 86_400.0 * 40.0, 2.0]
            .iter()
            .map(|&s| Timestamp::from_unix_seconds(s))
            .collect();
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mut t = Track::from_xyz(Srid::Enu, &x, &x, None, Some(&times)).unwrap();
        t.create_feature("k", 0.0).unwrap();
        t.set_column("k", &x).unwrap();
        assert!(!t.is_sorted());

        let mut radix = t.clone();
        radix.sort_radix();
        t.sort();
        assert!(t.is_sorted());
        assert_eq!(t, radix);
        assert_eq!(t.column("x").unwrap(), vec![1.0, 4.0, 2.0, 0.0, 3.0]);
        assert_eq!(t.feature("k").unwrap(), &[1.0, 4.0, 2.0, 0.0, 3.0]);

        let mut again = t.clone();
        again.sort();
        assert_eq!(again, t);
    }

    #[test]
    fn test_conversions_keep_size() {
        let lon: Vec<f64> = (0..10).map(|i| 2.0 + i as f64 * 1e-4).collect();
        let lat = vec![45.0; 10];
        let mut t = Track::from_xyz(Srid::Geo, &lon, &lat, None, None).unwrap();
        let original = t.clone();

        t.to_ecef(None).unwrap();
        assert_eq!(t.srid(), Srid::Ecef);
        t.to_enu(None).unwrap();
        assert_eq!(t.size(), 10);
        let base = t.base().unwrap();
        assert_relative_eq!(base.lon, 2.0, epsilon = 1e-9);
        assert_relative_eq!(base.lat, 45.0, epsilon = 1e-9);
        assert_relative_eq!(t.positions()[0].norm(), 0.0, epsilon = 1e-6);

        t.to_geo(None).unwrap();
        for (a, b) in t.positions().iter().zip(original.positions()) {
            assert_relative_eq!(a.get_x(), b.get_x(), epsilon = 1e-9);
            assert_relative_eq!(a.get_y(), b.get_y(), epsilon = 1e-9);
        }

        t.to_proj(2154).unwrap();
        assert_eq!(t.srid(), Srid::Proj(2154));
        t.translate(10.0, 0.0, 0.0).unwrap();
        t.to_geo(None).unwrap();
        assert!(t.positions()[0].get_x() > 2.0);
    }

    #[test]
    fn test_affine_requires_enu() {
        let mut t = Track::from_xyz(Srid::Geo, &[1.0], &[2.0], None, None).unwrap();
        assert!(matches!(t.rotate(0.1), Err(TrackError::WrongCoordSystem { .. })));
        let mut e = line(3);
        e.scale(2.0).unwrap();
        assert_eq!(e.column("x").unwrap(), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_deniv() {
        let z = [0.0, 5.0, 3.0, 8.0, 6.0];
        let x = [0.0; 5];
        let t = Track::from_xyz(Srid::Enu, &x, &x, Some(&z), None).unwrap();
        assert_relative_eq!(t.net_deniv(0, 4).unwrap(), 6.0);
        assert_relative_eq!(t.asc_deniv(0, 4).unwrap(), 10.0);
        assert_relative_eq!(t.desc_deniv(0, 4).unwrap(), -4.0);
        assert_relative_eq!(t.asc_deniv(1, 2).unwrap(), 0.0);
        assert!(t.net_deniv(3, 1).is_err());
    }

    #[test]
    fn test_sampling() {
        let t = line(11);
        assert_relative_eq!(t.interval(SamplingMode::Temporal).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(t.frequency(SamplingMode::Spatial).unwrap(), 1.0, epsilon = 1e-9);
        assert!(line(1).interval(SamplingMode::Temporal).is_err());
    }

    #[test]
    fn test_summary_display() {
        let mut t = line(3).with_ids("u1", "t7");
        t.create_feature("speed", 0.0).unwrap();
        let text = t.summary().to_string();
        assert!(text.contains("Track t7 (user u1) in ENU"));
        assert!(text.contains("observations : 3"));
        assert!(text.contains("speed"));
    }
}
