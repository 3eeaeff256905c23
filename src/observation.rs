//! A single time-stamped position.
//!
//! Outside of a [`Track`](crate::track::Track) an observation carries its own positional
//! feature vector. Inside a track, features live in the track's named columns and an
//! [`Observation`] is only materialised on demand (see `Track::obs`).
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::Coord;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub position: Coord,
    pub timestamp: Timestamp,
    /// Positional analytical feature values; names are held by the owning track.
    pub features: Vec<f64>,
}

impl Observation {
    pub fn new(position: Coord, timestamp: Timestamp) -> Self {
        Observation {
            position,
            timestamp,
            features: Vec::new(),
        }
    }

    pub fn with_features(position: Coord, timestamp: Timestamp, features: Vec<f64>) -> Self {
        Observation {
            position,
            timestamp,
            features,
        }
    }

    /// Horizontal distance to another observation.
    pub fn distance_2d(&self, other: &Observation) -> f64 {
        self.position.distance_2d(&other.position)
    }

    pub fn distance_3d(&self, other: &Observation) -> f64 {
        self.position.distance_3d(&other.position)
    }

    /// Signed elapsed seconds from `other` to `self`.
    pub fn elapsed_since(&self, other: &Observation) -> f64 {
        self.timestamp - other.timestamp
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp, self.position)
    }
}
