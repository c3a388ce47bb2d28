//! Traits shared by the outputs of every filtering algorithm

use crate::types::{Symmetric, Vector};

/// Snapshot of one filter step.
///
/// This trait indicates that the implementor carries the outputs of a single update: the
/// state estimate, the measurement the step worked with, the innovation and the posterior and
/// predicted covariances. Values are fixed once the estimate is built; implementors that
/// derive some of them lazily must still return the same value on every call.
pub trait Estimate {
    /// Estimated state vector.
    fn state(&self) -> &Vector;

    /// Measurement associated with this step.
    fn measurement(&self) -> &Vector;

    /// Innovation (measurement residual) of this step.
    fn innovation(&self) -> &Vector;

    /// Posterior state covariance.
    fn covariance(&self) -> &Symmetric<f64>;

    /// Predicted (prior) state covariance.
    fn predicted_covariance(&self) -> &Symmetric<f64>;

    /// Returns whether every state component lies within `n` standard deviations.
    ///
    /// For every dimension `i` this checks `|state[i]| <= n * sqrt(covariance[i][i])`; a
    /// component exactly on the bound counts as within it. This is a diagnostic and plays no
    /// part in the filters' own control flow.
    fn within_n_sigma(&self, n: f64) -> bool {
        let state = self.state();
        let covariance = self.covariance();
        state
            .iter()
            .enumerate()
            .all(|(i, value)| value.abs() <= n * covariance[[i, i]].sqrt())
    }

    /// Shorthand for `within_n_sigma(2.0)`.
    fn within_two_sigma(&self) -> bool {
        self.within_n_sigma(2.0)
    }
}
