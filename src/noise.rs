//! Process and measurement noise sources.
//!
//! A filter never inspects which source it was given: everything goes through the [`Noise`]
//! trait. Three sources are provided:
//! - [`Noiseless`] keeps every dimension contract but draws only zeros,
//! - [`BatchNoise`] replays pre-recorded draws step by step,
//! - [`GaussianNoise`] samples a zero-mean multivariate normal from a caller-seeded generator.
use std::fmt;

use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{FilterError, NoiseKind, Result};
use crate::types::{Matrix, Symmetric, Vector};

/// Relative tolerance on negative eigenvalues accepted when factoring a covariance.
pub const PSD_TOLERANCE: f64 = 1e-12;

/// Noise affecting a filtered system.
pub trait Noise: fmt::Debug + Send {
    /// Process noise draw `w` at step `k`.
    fn process(&mut self, k: usize) -> Result<Vector>;

    /// Measurement noise draw `v` at step `k`.
    fn measurement(&mut self, k: usize) -> Result<Vector>;

    /// Process noise covariance `Q`.
    fn process_matrix(&self) -> Symmetric<f64>;

    /// Measurement noise covariance `R`.
    fn measurement_matrix(&self) -> Symmetric<f64>;

    /// Rewinds any internal sequence to its initial position.
    fn reset(&mut self);
}

/// Noise source drawing only zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct Noiseless {
    process_size: usize,
    measurement_size: usize,
    q: Symmetric<f64>,
    r: Symmetric<f64>,
}

impl Noiseless {
    /// Zero draws and zero covariance matrices of the given sizes.
    pub fn new(process_size: usize, measurement_size: usize) -> Self {
        Noiseless {
            process_size,
            measurement_size,
            q: Symmetric::zeros(process_size),
            r: Symmetric::zeros(measurement_size),
        }
    }

    /// Zero draws, but `Q` and `R` are reported as given.
    ///
    /// Useful to run a filter deterministically while it still weighs measurements with a
    /// realistic `R`.
    pub fn with_covariances(q: Symmetric<f64>, r: Symmetric<f64>) -> Self {
        Noiseless {
            process_size: q.size(),
            measurement_size: r.size(),
            q,
            r,
        }
    }
}

impl Noise for Noiseless {
    fn process(&mut self, _k: usize) -> Result<Vector> {
        Ok(Array1::zeros(self.process_size))
    }

    fn measurement(&mut self, _k: usize) -> Result<Vector> {
        Ok(Array1::zeros(self.measurement_size))
    }

    fn process_matrix(&self) -> Symmetric<f64> {
        self.q.clone()
    }

    fn measurement_matrix(&self) -> Symmetric<f64> {
        self.r.clone()
    }

    fn reset(&mut self) {}
}

/// Replays pre-recorded noise, one vector per step.
///
/// The covariance of the recorded draws is not tracked: `Q` and `R` are zero matrices sized
/// after the first recorded vector of each sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNoise {
    process: Vec<Vector>,
    measurement: Vec<Vector>,
}

impl BatchNoise {
    pub fn new(process: Vec<Vector>, measurement: Vec<Vector>) -> Result<Self> {
        if process.is_empty() {
            return Err(FilterError::EmptyNoiseBatch(NoiseKind::Process));
        }
        if measurement.is_empty() {
            return Err(FilterError::EmptyNoiseBatch(NoiseKind::Measurement));
        }
        Ok(BatchNoise {
            process,
            measurement,
        })
    }

    /// Number of recorded steps for each sequence, as `(process, measurement)`.
    pub fn recorded_steps(&self) -> (usize, usize) {
        (self.process.len(), self.measurement.len())
    }

    fn draw(sequence: &[Vector], kind: NoiseKind, k: usize) -> Result<Vector> {
        sequence
            .get(k)
            .cloned()
            .ok_or(FilterError::IndexOutOfRange {
                kind,
                step: k,
                len: sequence.len(),
            })
    }
}

impl Noise for BatchNoise {
    fn process(&mut self, k: usize) -> Result<Vector> {
        Self::draw(&self.process, NoiseKind::Process, k)
    }

    fn measurement(&mut self, k: usize) -> Result<Vector> {
        Self::draw(&self.measurement, NoiseKind::Measurement, k)
    }

    fn process_matrix(&self) -> Symmetric<f64> {
        Symmetric::zeros(self.process[0].len())
    }

    fn measurement_matrix(&self) -> Symmetric<f64> {
        Symmetric::zeros(self.measurement[0].len())
    }

    // Draws are addressed by step, so rewinding the filter's step replays the batch.
    fn reset(&mut self) {}
}

/// Additive white Gaussian noise with fixed covariances `Q` and `R`.
///
/// Each covariance is factored once as `V·diag(√λ)` from its symmetric eigendecomposition,
/// which also accepts singular (positive semi-definite) covariances. Draws come from the
/// generator handed over at construction; [`Noise::reset`] restores that generator to its
/// initial state so a run can be replayed exactly.
#[derive(Clone)]
pub struct GaussianNoise {
    q: Symmetric<f64>,
    r: Symmetric<f64>,
    process_factor: Matrix,
    measurement_factor: Matrix,
    rng: StdRng,
    initial_rng: StdRng,
}

impl GaussianNoise {
    pub fn new(q: Symmetric<f64>, r: Symmetric<f64>, rng: StdRng) -> Result<Self> {
        let process_factor = covariance_factor(&q, NoiseKind::Process)?;
        let measurement_factor = covariance_factor(&r, NoiseKind::Measurement)?;
        Ok(GaussianNoise {
            q,
            r,
            process_factor,
            measurement_factor,
            initial_rng: rng.clone(),
            rng,
        })
    }

    /// Same as [`GaussianNoise::new`] with a generator seeded from `seed`.
    pub fn seeded(q: Symmetric<f64>, r: Symmetric<f64>, seed: u64) -> Result<Self> {
        Self::new(q, r, StdRng::seed_from_u64(seed))
    }

    fn sample(factor: &Matrix, rng: &mut StdRng) -> Vector {
        let standard: Vector = (0..factor.ncols())
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        factor.dot(&standard)
    }
}

impl fmt::Debug for GaussianNoise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GaussianNoise")
            .field("q", &self.q)
            .field("r", &self.r)
            .finish()
    }
}

impl Noise for GaussianNoise {
    fn process(&mut self, _k: usize) -> Result<Vector> {
        Ok(Self::sample(&self.process_factor, &mut self.rng))
    }

    fn measurement(&mut self, _k: usize) -> Result<Vector> {
        Ok(Self::sample(&self.measurement_factor, &mut self.rng))
    }

    fn process_matrix(&self) -> Symmetric<f64> {
        self.q.clone()
    }

    fn measurement_matrix(&self) -> Symmetric<f64> {
        self.r.clone()
    }

    fn reset(&mut self) {
        self.rng = self.initial_rng.clone();
    }
}

/// Returns `L` with `L·Lᵀ == covariance`, or `InvalidCovariance` when the covariance has a
/// significantly negative eigenvalue.
fn covariance_factor(covariance: &Symmetric<f64>, which: NoiseKind) -> Result<Matrix> {
    let n = covariance.size();
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let (eigenvalues, eigenvectors) = covariance.eigh(UPLO::Lower)?;
    let largest = eigenvalues.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    if eigenvalues.iter().any(|v| *v < -PSD_TOLERANCE * largest) {
        return Err(FilterError::InvalidCovariance { which });
    }
    let mut factor = eigenvectors;
    for (mut column, value) in factor.columns_mut().into_iter().zip(eigenvalues.iter()) {
        column *= value.max(0.0).sqrt();
    }
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{as_symmetric, identity, scaled_identity};
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    #[test]
    fn noiseless_preserves_dimensions() {
        let mut noise = Noiseless::new(4, 2);
        assert_eq!(noise.process(0).unwrap(), Array1::<f64>::zeros(4));
        assert_eq!(noise.measurement(17).unwrap(), Array1::<f64>::zeros(2));
        assert_eq!(noise.process_matrix(), Symmetric::zeros(4));
        assert_eq!(noise.measurement_matrix(), Symmetric::zeros(2));
    }

    #[test]
    fn noiseless_with_covariances_reports_them_but_draws_zeros() {
        let mut noise =
            Noiseless::with_covariances(scaled_identity(3, 0.1), scaled_identity(1, 0.5));
        assert_eq!(noise.process(3).unwrap(), Array1::<f64>::zeros(3));
        assert_eq!(noise.measurement(3).unwrap(), Array1::<f64>::zeros(1));
        assert_eq!(noise.measurement_matrix(), scaled_identity(1, 0.5));
    }

    #[test]
    fn batch_noise_replays_in_order() {
        let process = vec![arr1(&[1.0, 2.0]), arr1(&[3.0, 4.0])];
        let measurement = vec![arr1(&[-1.0]), arr1(&[-2.0])];
        let mut noise = BatchNoise::new(process, measurement).unwrap();
        assert_eq!(noise.process(1).unwrap(), arr1(&[3.0, 4.0]));
        assert_eq!(noise.measurement(0).unwrap(), arr1(&[-1.0]));
        assert_eq!(noise.process_matrix(), Symmetric::zeros(2));
        assert_eq!(noise.measurement_matrix(), Symmetric::zeros(1));
        assert_eq!(noise.recorded_steps(), (2, 2));
    }

    #[test]
    fn batch_noise_past_the_recording_fails() -> std::result::Result<(), String> {
        let mut noise = BatchNoise::new(vec![arr1(&[0.0])], vec![arr1(&[0.0])]).unwrap();
        match noise.measurement(1) {
            Err(FilterError::IndexOutOfRange {
                kind: NoiseKind::Measurement,
                step: 1,
                len: 1,
            }) => Ok(()),
            other => Err(format!("expected IndexOutOfRange, got {:?}", other)),
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            BatchNoise::new(vec![], vec![arr1(&[0.0])]),
            Err(FilterError::EmptyNoiseBatch(NoiseKind::Process))
        ));
    }

    #[test]
    fn gaussian_noise_rejects_indefinite_covariance() -> std::result::Result<(), String> {
        let q = as_symmetric(&arr2(&[[1.0, 2.0], [2.0, 1.0]])).unwrap();
        match GaussianNoise::seeded(q, identity(1), 7) {
            Err(FilterError::InvalidCovariance {
                which: NoiseKind::Process,
            }) => Ok(()),
            other => Err(format!("expected InvalidCovariance, got {:?}", other)),
        }
    }

    #[test]
    fn gaussian_noise_accepts_singular_covariance() {
        let q = as_symmetric(&arr2(&[[0.0, 0.0], [0.0, 0.25]])).unwrap();
        let mut noise = GaussianNoise::seeded(q, identity(1), 7).unwrap();
        for k in 0..20 {
            let w = noise.process(k).unwrap();
            assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn gaussian_noise_is_reproducible_and_resettable() {
        let q = scaled_identity(3, 2.0);
        let r = scaled_identity(2, 0.5);
        let mut a = GaussianNoise::seeded(q.clone(), r.clone(), 42).unwrap();
        let mut b = GaussianNoise::seeded(q, r, 42).unwrap();

        let first: Vec<Vector> = (0..5).map(|k| a.measurement(k).unwrap()).collect();
        let second: Vec<Vector> = (0..5).map(|k| b.measurement(k).unwrap()).collect();
        assert_eq!(first, second);

        a.reset();
        let replay: Vec<Vector> = (0..5).map(|k| a.measurement(k).unwrap()).collect();
        assert_eq!(first, replay);
    }

    #[test]
    fn gaussian_noise_matches_its_covariance() {
        let r = as_symmetric(&arr2(&[[4.0, 1.0], [1.0, 2.0]])).unwrap();
        let mut noise = GaussianNoise::seeded(identity(1), r, 3).unwrap();
        let samples = 20_000;
        let mut second_moment = Array2::<f64>::zeros((2, 2));
        for k in 0..samples {
            let v = noise.measurement(k).unwrap();
            for i in 0..2 {
                for j in 0..2 {
                    second_moment[[i, j]] += v[i] * v[j];
                }
            }
        }
        second_moment /= samples as f64;
        assert_abs_diff_eq!(second_moment[[0, 0]], 4.0, epsilon = 0.2);
        assert_abs_diff_eq!(second_moment[[0, 1]], 1.0, epsilon = 0.15);
        assert_abs_diff_eq!(second_moment[[1, 1]], 2.0, epsilon = 0.1);
    }
}
