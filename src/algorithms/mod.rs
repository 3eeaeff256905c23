//! # Algorithms
//!
//! Geometric and combinatorial processing of whole tracks.
//!
//! * [`geometry`] – enclosing and fitted circles, principal rectangles, planar distances,
//! * [`partition`] – `O(n³)` optimal partition solver shared by stops and simplification,
//! * [`segmentation`] – threshold markers, splitting, stops, return trips,
//! * [`simplification`] – Douglas–Peucker, Visvalingam and optimal simplification.
//!
//! Everything here works on the horizontal components and expects ENU or projected
//! tracks.
pub mod geometry;
pub mod partition;
pub mod segmentation;
pub mod simplification;

pub use geometry::{fit_circle, minimum_enclosing_circle, principal_mbr, Circle, Mbr};
pub use partition::{optimal_partition, PartitionMode};
pub use segmentation::{
    find_stops, segmentation, split, split_at_indices, split_return_trip, MarkerMode,
    ReturnTrip, ReturnTripMode, Stop, StopMode,
};
pub use simplification::{simplify, SimplificationMode};
