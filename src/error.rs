//! Error type shared by every estimator in the crate.

use ndarray_linalg::error::LinalgError;
use thiserror::Error;

use crate::types::DimensionAgreement;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Which of the two noise sequences a noise query addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    Process,
    Measurement,
}

impl std::fmt::Display for NoiseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseKind::Process => write!(f, "process"),
            NoiseKind::Measurement => write!(f, "measurement"),
        }
    }
}

/// Errors produced while building or stepping a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Two operands violate the shape relation an operation requires
    #[error("{lhs} {lhs_shape:?} and {rhs} {rhs_shape:?} do not satisfy {relation}")]
    DimensionMismatch {
        lhs: &'static str,
        rhs: &'static str,
        lhs_shape: (usize, usize),
        rhs_shape: (usize, usize),
        relation: DimensionAgreement,
    },

    /// A matrix expected to be square is not
    #[error("matrix of shape {rows}x{cols} is not square")]
    NotSquare { rows: usize, cols: usize },

    /// A matrix expected to be symmetric differs from its transpose
    #[error("matrix is not symmetric: entry ({row}, {col}) differs from ({col}, {row})")]
    NotSymmetric { row: usize, col: usize },

    /// A required inversion failed
    #[error("could not invert `{what}` at k={step}")]
    SingularMatrix {
        what: &'static str,
        step: usize,
        #[source]
        source: LinalgError,
    },

    /// `update` was called on a locked covariance filter
    #[error("filter is locked (call prepare() before update())")]
    ProtocolViolation,

    /// A recorded noise sequence was queried past its end
    #[error("no {kind} noise recorded at step k={step} (only {len} recorded)")]
    IndexOutOfRange {
        kind: NoiseKind,
        step: usize,
        len: usize,
    },

    /// A noise covariance is not positive semi-definite
    #[error("{which} noise covariance is not positive semi-definite")]
    InvalidCovariance { which: NoiseKind },

    /// A batch noise source was built without any recorded draws
    #[error("batch noise needs at least one recorded {0} vector")]
    EmptyNoiseBatch(NoiseKind),

    /// The filter has a non-zero control matrix but no control vector was supplied
    #[error("control vector (u) is required because the control matrix (G) is non-zero")]
    MissingControl,

    /// Any other LAPACK failure
    #[error("linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),

    /// The estimate consumer stopped receiving
    #[error("estimate consumer is no longer receiving")]
    SinkClosed,

    /// The estimate consumer failed
    #[error("estimate consumer failed: {0}")]
    Sink(String),
}
