use thiserror::Error;

use crate::constants::{EdgeId, NodeId};

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Wrong coordinate system: expected {expected}, found {found}")]
    WrongCoordSystem { expected: String, found: String },

    #[error("Length mismatch for {what}: {left} vs {right}")]
    LengthMismatch {
        what: String,
        left: usize,
        right: usize,
    },

    #[error("Reserved analytical feature name: {0}")]
    ReservedFeatureName(String),

    #[error("Analytical feature not found: {0}")]
    MissingFeature(String),

    #[error("Analytical feature already exists: {0}")]
    DuplicateFeature(String),

    #[error("Unknown node id: {0}")]
    UnknownNode(NodeId),

    #[error("Unknown edge id: {0}")]
    UnknownEdge(EdgeId),

    #[error("Index {index} out of range for a track of {len} observations")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Empty track passed to {0}")]
    EmptyTrack(String),

    #[error("Singular matrix during {0}")]
    SingularMatrix(String),

    #[error("Covariance matrix is not positive definite ({0})")]
    NotPositiveDefinite(String),

    #[error("Input out of domain: {0}")]
    OutOfDomain(String),

    #[error("Invalid time format: {0}")]
    TimeFormat(String),

    #[error("Unable to parse timestamp: {0}")]
    TimeParse(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unknown coordinate system code: {0}")]
    UnknownCoordCode(String),

    #[error("User callback failed at step {step}: {message}")]
    Callback { step: usize, message: String },

    #[error("Noise distribution error: {0}")]
    NoiseDistribution(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rand_distr::NormalError> for TrackError {
    fn from(err: rand_distr::NormalError) -> Self {
        TrackError::NoiseDistribution(format!("{err:?}"))
    }
}

impl From<rand_distr::ExpError> for TrackError {
    fn from(err: rand_distr::ExpError) -> Self {
        TrackError::NoiseDistribution(format!("{err:?}"))
    }
}

impl TrackError {
    pub(crate) fn wrong_srid(expected: &str, found: impl std::fmt::Display) -> Self {
        TrackError::WrongCoordSystem {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn mismatch(what: &str, left: usize, right: usize) -> Self {
        TrackError::LengthMismatch {
            what: what.to_string(),
            left,
            right,
        }
    }

    pub(crate) fn singular(what: &str) -> Self {
        TrackError::SingularMatrix(what.to_string())
    }
}

impl PartialEq for TrackError {
    fn eq(&self, other: &Self) -> bool {
        use TrackError::*;
        match (self, other) {
            (
                WrongCoordSystem {
                    expected: a,
                    found: b,
                },
                WrongCoordSystem {
                    expected: c,
                    found: d,
                },
            ) => a == c && b == d,
            (
                LengthMismatch {
                    what: a,
                    left: b,
                    right: c,
                },
                LengthMismatch {
                    what: d,
                    left: e,
                    right: f,
                },
            ) => a == d && b == e && c == f,
            (ReservedFeatureName(a), ReservedFeatureName(b)) => a == b,
            (MissingFeature(a), MissingFeature(b)) => a == b,
            (DuplicateFeature(a), DuplicateFeature(b)) => a == b,
            (UnknownNode(a), UnknownNode(b)) => a == b,
            (UnknownEdge(a), UnknownEdge(b)) => a == b,
            (
                IndexOutOfRange { index: a, len: b },
                IndexOutOfRange { index: c, len: d },
            ) => a == c && b == d,
            (EmptyTrack(a), EmptyTrack(b)) => a == b,
            (SingularMatrix(a), SingularMatrix(b)) => a == b,
            (NotPositiveDefinite(a), NotPositiveDefinite(b)) => a == b,
            (OutOfDomain(a), OutOfDomain(b)) => a == b,
            (TimeFormat(a), TimeFormat(b)) => a == b,
            (TimeParse(a), TimeParse(b)) => a == b,
            (InvalidQuery(a), InvalidQuery(b)) => a == b,
            (UnknownCoordCode(a), UnknownCoordCode(b)) => a == b,
            (
                Callback {
                    step: a,
                    message: b,
                },
                Callback {
                    step: c,
                    message: d,
                },
            ) => a == c && b == d,
            (NoiseDistribution(a), NoiseDistribution(b)) => a == b,

            // Not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (Serialization(_), Serialization(_)) => true,

            _ => false,
        }
    }
}
