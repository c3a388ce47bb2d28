//! Covariance-form recursive estimator usable as a classical (linear) Kalman filter or as a
//! linearized (extended) one.
//!
//! The model matrices are not fixed at construction: before every step the caller hands over
//! the transition matrix Φ and the measurement Jacobian H̃ for that step through
//! [`HybridFilter::prepare`], and only then may [`HybridFilter::update`] run. This makes
//! per-step linearization and switching measurement models (for instance which measurement
//! rows are active) part of the normal call sequence:
//!
//! ```no_run
//! use ndarray::{arr1, arr2};
//! use rusty_kalman::filter::HybridFilter;
//! use rusty_kalman::noise::Noiseless;
//! use rusty_kalman::types::scaled_identity;
//!
//! let noise = Noiseless::with_covariances(scaled_identity(2, 0.0), scaled_identity(1, 0.5));
//! let mut kf = HybridFilter::new(arr1(&[0.0, 1.0]), scaled_identity(2, 10.0), noise, 1)?;
//! let phi = arr2(&[[1.0, 0.1], [0.0, 1.0]]);
//! let h = arr2(&[[1.0, 0.0]]);
//! kf.prepare(phi, h)?;
//! let estimate = kf.update(&arr1(&[0.12]), &arr1(&[0.0]))?;
//! # Ok::<(), rusty_kalman::error::FilterError>(())
//! ```
use std::fmt;

use ndarray::{Array1, Array2};
use ndarray_linalg::Inverse;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kalman_common::quadratic_form;
use super::traits::Estimate;
use crate::error::{FilterError, Result};
use crate::noise::Noise;
use crate::types::{
    as_symmetric, check_dims, identity, DimensionAgreement, Matrix, Symmetric, Vector,
};

/// Options of the covariance-form filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Add the process noise covariance `Q` to the predicted covariance. Off by default, in
    /// which case the prediction is `Φ·P·Φᵀ` alone.
    pub add_process_noise: bool,
    /// Start directly in linearized mode.
    pub linearized: bool,
}

impl HybridConfig {
    pub fn with_process_noise(mut self, enabled: bool) -> Self {
        self.add_process_noise = enabled;
        self
    }

    pub fn with_linearized(mut self, enabled: bool) -> Self {
        self.linearized = enabled;
        self
    }
}

/// Whether [`HybridFilter::update`] is currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// `prepare` supplied the model for the next step
    Unlocked,
    /// the model of the last step was consumed; `prepare` must be called again
    Locked,
}

/// Output of one [`HybridFilter`] step.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceEstimate {
    state: Vector,
    measurement: Vector,
    innovation: Vector,
    observation_deviation: Vector,
    covariance: Symmetric<f64>,
    predicted_covariance: Symmetric<f64>,
    gain: Option<Matrix>,
}

impl CovarianceEstimate {
    /// Difference between the real and the computed observation of this step.
    pub fn observation_deviation(&self) -> &Vector {
        &self.observation_deviation
    }

    /// Kalman gain of this step; `None` for the initial estimate.
    pub fn gain(&self) -> Option<&Matrix> {
        self.gain.as_ref()
    }
}

impl Estimate for CovarianceEstimate {
    fn state(&self) -> &Vector {
        &self.state
    }

    fn measurement(&self) -> &Vector {
        &self.measurement
    }

    fn innovation(&self) -> &Vector {
        &self.innovation
    }

    fn covariance(&self) -> &Symmetric<f64> {
        &self.covariance
    }

    fn predicted_covariance(&self) -> &Symmetric<f64> {
        &self.predicted_covariance
    }
}

impl fmt::Display for CovarianceEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "s={}", self.state)?;
        writeln!(f, "y={}", self.measurement)?;
        writeln!(f, "P={}", self.covariance)?;
        match &self.gain {
            Some(gain) => writeln!(f, "K={}", gain)?,
            None => writeln!(f, "K=none")?,
        }
        writeln!(f, "P-={}", self.predicted_covariance)?;
        writeln!(f, "i={}", self.innovation)?;
        write!(f, "}}")
    }
}

/// Covariance-form Kalman filter supporting classical and linearized updates.
///
/// The filter starts `Locked`. Each [`prepare`](HybridFilter::prepare) stores the step's Φ and
/// H̃ and unlocks it; each successful [`update`](HybridFilter::update) consumes them and locks
/// it again. A failed update leaves every part of the filter untouched, so the step can be
/// retried with corrected inputs.
#[derive(Debug)]
pub struct HybridFilter {
    transition: Matrix,
    measurement_jacobian: Matrix,
    noise: Box<dyn Noise>,
    previous: CovarianceEstimate,
    linearized: bool,
    lock: Lock,
    step: usize,
    config: HybridConfig,
}

impl HybridFilter {
    /// Creates a classical-mode filter seeded with `x0` and `p0`.
    ///
    /// `measurement_size` sizes the measurement-related vectors of the initial estimate.
    pub fn new(
        x0: Vector,
        p0: Symmetric<f64>,
        noise: impl Noise + 'static,
        measurement_size: usize,
    ) -> Result<Self> {
        Self::with_config(x0, p0, noise, measurement_size, HybridConfig::default())
    }

    pub fn with_config(
        x0: Vector,
        p0: Symmetric<f64>,
        noise: impl Noise + 'static,
        measurement_size: usize,
        config: HybridConfig,
    ) -> Result<Self> {
        check_dims(&x0, &p0, "x0", "P0", DimensionAgreement::RowsToCols)?;
        let r = noise.measurement_matrix();
        if r.size() != measurement_size {
            return Err(FilterError::DimensionMismatch {
                lhs: "R",
                rhs: "measurement size",
                lhs_shape: r.dim(),
                rhs_shape: (measurement_size, 1),
                relation: DimensionAgreement::RowsToRows,
            });
        }
        if config.add_process_noise {
            let q = noise.process_matrix();
            check_dims(&q, &p0, "Q", "P0", DimensionAgreement::RowsAndCols)?;
        }

        let n = x0.len();
        let initial = CovarianceEstimate {
            state: x0,
            measurement: Array1::zeros(measurement_size),
            innovation: Array1::zeros(measurement_size),
            observation_deviation: Array1::zeros(measurement_size),
            covariance: p0,
            predicted_covariance: Symmetric::zeros(n),
            gain: None,
        };
        Ok(HybridFilter {
            transition: Array2::zeros((n, n)),
            measurement_jacobian: Array2::zeros((measurement_size, n)),
            noise: Box::new(noise),
            previous: initial,
            linearized: config.linearized,
            lock: Lock::Locked,
            step: 0,
            config,
        })
    }

    /// Supplies Φ and H̃ for the next step and unlocks the filter.
    ///
    /// Φ must be square and match the state dimension, H̃ must have one column per state
    /// component. On a shape error the filter keeps its previous model and lock state.
    pub fn prepare(&mut self, transition: Matrix, measurement_jacobian: Matrix) -> Result<()> {
        let covariance = &self.previous.covariance;
        check_dims(&transition, covariance, "Φ", "P", DimensionAgreement::RowsAndCols)?;
        check_dims(&measurement_jacobian, covariance, "H̃", "P", DimensionAgreement::ColsToRows)?;

        self.transition = transition;
        self.measurement_jacobian = measurement_jacobian;
        self.lock = Lock::Unlocked;
        Ok(())
    }

    /// Runs one filter step with the model supplied by the last [`prepare`](Self::prepare).
    ///
    /// `computed_observation` is subtracted from `real_observation` to form the observation
    /// deviation. In linearized mode the caller is expected to pass an already-centered
    /// computed observation and the state estimate is the deviation `K·y`; in classical mode
    /// the usual predict/correct cycle runs on `y`.
    pub fn update(
        &mut self,
        real_observation: &Vector,
        computed_observation: &Vector,
    ) -> Result<CovarianceEstimate> {
        if self.lock == Lock::Locked {
            return Err(FilterError::ProtocolViolation);
        }
        check_dims(
            real_observation,
            computed_observation,
            "real observation",
            "computed observation",
            DimensionAgreement::RowsAndCols,
        )?;
        let phi = &self.transition;
        let h = &self.measurement_jacobian;
        check_dims(h, real_observation, "H̃", "real observation", DimensionAgreement::RowsToRows)?;
        let r = self.noise.measurement_matrix();
        check_dims(&r, h, "R", "H̃", DimensionAgreement::RowsToRows)?;

        // P⁻ = Φ·P·Φᵀ (+ Q)
        let mut predicted =
            quadratic_form(phi, &*self.previous.covariance, "Φ", "P")?.into_inner();
        if self.config.add_process_noise {
            let q = self.noise.process_matrix();
            check_dims(&q, &predicted, "Q", "Φ·P·Φᵀ", DimensionAgreement::RowsAndCols)?;
            predicted += &*q;
        }
        let predicted = as_symmetric(&predicted)?;

        // K = P⁻·H̃ᵀ·(H̃·P⁻·H̃ᵀ + R)⁻¹
        let mut innovation_covariance = quadratic_form(h, &*predicted, "H̃", "P⁻")?.into_inner();
        innovation_covariance += &*r;
        let step = self.step;
        // S is symmetric but not necessarily positive definite: R is only checked for symmetry.
        let innovation_covariance_inv = innovation_covariance.inv().map_err(
            |source| FilterError::SingularMatrix {
                what: "innovation covariance",
                step,
                source,
            },
        )?;
        let gain = predicted.dot(&h.t()).dot(&innovation_covariance_inv);

        let deviation = real_observation - computed_observation;

        let (state, innovation) = if self.linearized {
            (gain.dot(&deviation), deviation.clone())
        } else {
            check_dims(phi, &self.previous.state, "Φ", "x", DimensionAgreement::ColsToRows)?;
            let predicted_state = phi.dot(&self.previous.state);
            let predicted_measurement = h.dot(&predicted_state);
            let innovation = &deviation - &predicted_measurement;
            let state = &predicted_state + &gain.dot(&innovation);
            (state, innovation)
        };

        // Joseph form: P = (I − K·H̃)·P⁻·(I − K·H̃)ᵀ + K·R·Kᵀ
        let n = predicted.size();
        let reduction = &*identity::<f64>(n) - &gain.dot(h);
        let mut covariance =
            quadratic_form(&reduction, &*predicted, "I - K·H̃", "P⁻")?.into_inner();
        covariance += &*quadratic_form(&gain, &*r, "K", "R")?;
        let covariance = as_symmetric(&covariance)?;

        let estimate = CovarianceEstimate {
            state,
            measurement: real_observation.clone(),
            innovation,
            observation_deviation: deviation,
            covariance,
            predicted_covariance: predicted,
            gain: Some(gain),
        };
        debug!(step = self.step, linearized = self.linearized, "covariance filter update");
        self.previous = estimate.clone();
        self.step += 1;
        self.lock = Lock::Locked;
        Ok(estimate)
    }

    /// Switches to linearized mode. There is no way back to classical mode.
    pub fn enable_linearized_mode(&mut self) {
        self.linearized = true;
    }

    pub fn is_linearized(&self) -> bool {
        self.linearized
    }

    pub fn lock_state(&self) -> Lock {
        self.lock
    }

    /// Number of successful updates so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Transition matrix Φ of the last [`prepare`](Self::prepare), zero before the first.
    pub fn transition(&self) -> &Matrix {
        &self.transition
    }

    /// Measurement Jacobian H̃ of the last [`prepare`](Self::prepare), zero before the first.
    pub fn measurement_jacobian(&self) -> &Matrix {
        &self.measurement_jacobian
    }

    pub fn previous_estimate(&self) -> &CovarianceEstimate {
        &self.previous
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn noise(&self) -> &dyn Noise {
        self.noise.as_ref()
    }

    pub fn noise_mut(&mut self) -> &mut dyn Noise {
        self.noise.as_mut()
    }

    pub fn set_noise(&mut self, noise: impl Noise + 'static) {
        self.noise = Box::new(noise);
    }
}

impl fmt::Display for HybridFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.linearized { "linearized" } else { "classical" };
        write!(f, "HybridFilter [k={}, {}]\n{:?}", self.step, mode, self.noise)
    }
}
