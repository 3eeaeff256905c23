//! # Filtering
//!
//! * [`fourier`] – low/high pass filtering of columns in the frequency domain,
//! * [`kalman`] – linear and unscented Kalman filters, RTS smoother,
//! * [`hmm`] – Viterbi decoding of hidden Markov models.
//!
//! Kernel smoothing of a single column is the `Filter` transform of
//! [`crate::operator::UnaryVoidOp`].
pub mod fourier;
pub mod hmm;
pub mod kalman;

pub use fourier::{fourier_filter, FilterBand};
pub use hmm::{HiddenMarkovModel, HmmMode, HmmState, Measurement};
pub use kalman::{Covariance, KalmanFilter, KalmanMode, Model};
