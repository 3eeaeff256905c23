//! Ordered collections of tracks.
use std::ops::Index;

use crate::coords::{Coord, GeoCoords, Srid};
use crate::track::{BoundingBox, Track};
use crate::track_errors::TrackError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCollection {
    tracks: Vec<Track>,
}

impl TrackCollection {
    pub fn new() -> Self {
        TrackCollection::default()
    }

    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Track> {
        self.tracks.iter_mut()
    }

    pub fn into_vec(self) -> Vec<Track> {
        self.tracks
    }

    /// Union of the bounding boxes of the non-empty tracks.
    pub fn bbox(&self) -> Result<BoundingBox, TrackError> {
        self.tracks
            .iter()
            .filter_map(|t| t.bbox().ok())
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| TrackError::EmptyTrack("collection bbox".into()))
    }

    /// Convert every track to ENU around a common base: `base` if given, otherwise the
    /// first position of the first non-empty track.
    pub fn to_enu(&mut self, base: Option<GeoCoords>) -> Result<(), TrackError> {
        let base = match base {
            Some(b) => Some(b),
            None => match self.tracks.iter().find(|t| !t.is_empty()) {
                Some(first) => {
                    let mut head = first.extract(0, 1);
                    head.to_geo(None)?;
                    match head.positions()[0] {
                        Coord::Geo(g) => Some(g),
                        _ => None,
                    }
                }
                None => None,
            },
        };
        for track in self.tracks.iter_mut() {
            track.to_enu(base)?;
        }
        Ok(())
    }

    pub fn to_geo(&mut self) -> Result<(), TrackError> {
        self.tracks.iter_mut().try_for_each(|t| t.to_geo(None))
    }

    /// `true` when every track is expressed in `srid`.
    pub fn is_homogeneous(&self, srid: Srid) -> bool {
        self.tracks.iter().all(|t| t.srid() == srid)
    }

    /// Keep the tracks holding at least `min_size` observations.
    pub fn filter_by_size(&self, min_size: usize) -> TrackCollection {
        self.tracks
            .iter()
            .filter(|t| t.size() >= min_size)
            .cloned()
            .collect()
    }

    /// Concatenate every track, in order, into a single track.
    pub fn concatenate(&self) -> Result<Track, TrackError> {
        let mut iter = self.tracks.iter();
        let mut out = iter
            .next()
            .cloned()
            .ok_or_else(|| TrackError::EmptyTrack("concatenate".into()))?;
        for t in iter {
            out = out.concat(t)?;
        }
        Ok(out)
    }

    /// Total number of observations.
    pub fn total_size(&self) -> usize {
        self.tracks.iter().map(Track::size).sum()
    }
}

impl Index<usize> for TrackCollection {
    type Output = Track;

    fn index(&self, index: usize) -> &Track {
        &self.tracks[index]
    }
}

impl From<Vec<Track>> for TrackCollection {
    fn from(tracks: Vec<Track>) -> Self {
        TrackCollection { tracks }
    }
}

impl FromIterator<Track> for TrackCollection {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        TrackCollection {
            tracks: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TrackCollection {
    type Item = Track;
    type IntoIter = std::vec::IntoIter<Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.into_iter()
    }
}

impl<'a> IntoIterator for &'a TrackCollection {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

#[cfg(test)]
mod collection_test {
    use super::*;
    use approx::assert_relative_eq;

    fn geo_track(lon0: f64, n: usize) -> Track {
        let lon: Vec<f64> = (0..n).map(|i| lon0 + i as f64 * 1e-4).collect();
        let lat = vec![45.0; n];
        Track::from_xyz(Srid::Geo, &lon, &lat, None, None).unwrap()
    }

    #[test]
    fn test_common_base() {
        let mut c: TrackCollection = vec![geo_track(2.0, 3), geo_track(2.01, 5)].into();
        c.to_enu(None).unwrap();
        assert!(c.is_homogeneous(Srid::Enu));
        assert_eq!(c[0].base(), c[1].base());
        // second track starts ~790 m east of the shared base
        assert!(c[1].positions()[0].get_x() > 700.0);
        assert_relative_eq!(c[0].positions()[0].get_x(), 0.0, epsilon = 1e-6);
        assert_eq!(c.total_size(), 8);
    }

    #[test]
    fn test_filter_concat_bbox() {
        let c: TrackCollection = vec![geo_track(2.0, 3), geo_track(3.0, 1), geo_track(4.0, 2)]
            .into_iter()
            .collect();
        assert_eq!(c.filter_by_size(2).len(), 2);
        let all = c.concatenate().unwrap();
        assert_eq!(all.size(), 6);
        let bb = c.bbox().unwrap();
        assert_relative_eq!(bb.xmin, 2.0);
        assert_relative_eq!(bb.xmax, 4.0001);
        assert!(TrackCollection::new().concatenate().is_err());
    }
}
