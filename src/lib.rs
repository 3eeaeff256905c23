//! # geotrack
//!
//! Time-stamped geospatial trajectories: coordinates and time, tracks with named
//! analytical features, column operators, resampling and interpolation, filtering,
//! segmentation and simplification, registration, correlated noise, track comparison
//! and road network routing.
//!
//! ```rust, no_run
//! use geotrack::coords::Srid;
//! use geotrack::interpolation::{resample, InterpolationAlgo, InterpolationMode, InterpolationParams, ResampleDelta};
//! use geotrack::track::Track;
//!
//! let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
//! let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
//! let track = Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap();
//! let dense = resample(
//!     &track,
//!     ResampleDelta::Step(0.5),
//!     InterpolationAlgo::Linear,
//!     InterpolationMode::Spatial,
//!     &InterpolationParams::default(),
//! )
//! .unwrap();
//! println!("{}", dense.summary());
//! ```
pub mod algorithms;
pub mod comparison;
pub mod constants;
pub mod coords;
pub mod filtering;
pub mod interpolation;
pub mod kernel;
pub mod network;
pub mod observation;
pub mod operator;
pub mod progress;
pub mod registration;
pub mod stochastic;
pub mod time;
pub mod track;
pub mod track_errors;

pub use coords::{Coord, Srid};
pub use time::Timestamp;
pub use track::collection::TrackCollection;
pub use track::Track;
pub use track_errors::TrackError;
