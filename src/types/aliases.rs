use ndarray::{Array1, Array2};

/// Column vector of reals.
pub type Vector = Array1<f64>;
/// Dense real matrix.
pub type Matrix = Array2<f64>;
