//! Information-form (inverse covariance) Kalman filter.
//!
//! Instead of a state and its covariance the filter carries the information vector
//! `i = P⁻¹·x` and the information matrix `I = P⁻¹`. Independent measurements then add up,
//! and complete ignorance about the state is simply `I = 0`, which the covariance form cannot
//! express. The price is that state and covariance have to be reconstructed by inversion;
//! [`InformationEstimate`] does that on first access and caches the result.
use std::cell::OnceCell;
use std::fmt;

use tracing::debug;

use super::kalman_common::{gram, inverse_or_zero, quadratic_form, symmetric_inverse_or_zero};
use super::traits::Estimate;
use crate::error::{FilterError, Result};
use crate::noise::Noise;
use crate::types::{
    as_symmetric, check_dims, is_zero, DimensionAgreement, Matrix, Symmetric, Vector,
};

/// Output of one [`InformationFilter`] step.
///
/// State, covariance and predicted covariance are derived by inverting the information
/// matrices the first time they are requested. While an information matrix is singular the
/// derived values are zero and a warning is logged; such early estimates carry no meaning.
#[derive(Debug, Clone)]
pub struct InformationEstimate {
    information_state: Vector,
    measurement: Vector,
    information_matrix: Symmetric<f64>,
    predicted_information_matrix: Symmetric<f64>,
    state: OnceCell<Vector>,
    covariance: OnceCell<Symmetric<f64>>,
    predicted_covariance: OnceCell<Symmetric<f64>>,
}

impl InformationEstimate {
    fn new(
        information_state: Vector,
        measurement: Vector,
        information_matrix: Symmetric<f64>,
        predicted_information_matrix: Symmetric<f64>,
    ) -> Self {
        InformationEstimate {
            information_state,
            measurement,
            information_matrix,
            predicted_information_matrix,
            state: OnceCell::new(),
            covariance: OnceCell::new(),
            predicted_covariance: OnceCell::new(),
        }
    }

    /// Information vector `i = P⁻¹·x`.
    pub fn information_state(&self) -> &Vector {
        &self.information_state
    }

    /// Information matrix `I = P⁻¹`.
    pub fn information_matrix(&self) -> &Symmetric<f64> {
        &self.information_matrix
    }

    pub fn predicted_information_matrix(&self) -> &Symmetric<f64> {
        &self.predicted_information_matrix
    }
}

impl Estimate for InformationEstimate {
    fn state(&self) -> &Vector {
        self.state.get_or_init(|| self.covariance().dot(&self.information_state))
    }

    fn measurement(&self) -> &Vector {
        &self.measurement
    }

    /// The information vector; the information form has no separate residual.
    fn innovation(&self) -> &Vector {
        &self.information_state
    }

    fn covariance(&self) -> &Symmetric<f64> {
        self.covariance.get_or_init(|| {
            symmetric_inverse_or_zero(&*self.information_matrix, "information matrix")
        })
    }

    fn predicted_covariance(&self) -> &Symmetric<f64> {
        self.predicted_covariance.get_or_init(|| {
            symmetric_inverse_or_zero(
                &*self.predicted_information_matrix,
                "predicted information matrix",
            )
        })
    }
}

// Cached derivations are a function of the stored fields, so they take no part in equality.
impl PartialEq for InformationEstimate {
    fn eq(&self, other: &Self) -> bool {
        self.information_state == other.information_state
            && self.measurement == other.measurement
            && self.information_matrix == other.information_matrix
            && self.predicted_information_matrix == other.predicted_information_matrix
    }
}

impl fmt::Display for InformationEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "i={}", self.information_state)?;
        writeln!(f, "y={}", self.measurement)?;
        writeln!(f, "I={}", self.information_matrix)?;
        writeln!(f, "I-={}", self.predicted_information_matrix)?;
        write!(f, "}}")
    }
}

/// Kalman filter in information form.
///
/// The transition matrix and both noise covariances are inverted once, when they are handed
/// to the filter. A singular input does not fail construction: its inverse is replaced by the
/// zero matrix and a warning is logged, so that term contributes no information.
#[derive(Debug)]
pub struct InformationFilter {
    transition_inverse: Matrix,
    input_control: Matrix,
    measurement_matrix: Matrix,
    process_inverse: Symmetric<f64>,
    measurement_inverse: Symmetric<f64>,
    noise: Box<dyn Noise>,
    needs_control: bool,
    initial: InformationEstimate,
    previous: InformationEstimate,
    step: usize,
}

impl InformationFilter {
    /// Creates a filter from an initial information vector and matrix.
    ///
    /// `input_control` (G) may be empty or zero, in which case [`update`](Self::update) takes
    /// no control input. Otherwise every update has to provide one.
    pub fn new(
        i0: Vector,
        information_matrix: Symmetric<f64>,
        transition: Matrix,
        input_control: Matrix,
        measurement_matrix: Matrix,
        noise: impl Noise + 'static,
    ) -> Result<Self> {
        check_dims(&i0, &information_matrix, "i0", "I0", DimensionAgreement::RowsToCols)?;
        check_dims(&transition, &information_matrix, "F", "I0", DimensionAgreement::RowsAndCols)?;
        check_dims(&measurement_matrix, &i0, "H", "i0", DimensionAgreement::ColsToRows)?;
        check_control(&input_control, &i0)?;
        check_noise(&noise, &transition, &measurement_matrix)?;

        let (process_inverse, measurement_inverse) = invert_noise(&noise);
        let measurement_size = measurement_matrix.nrows();
        let initial = InformationEstimate::new(
            i0,
            Vector::zeros(measurement_size),
            information_matrix,
            Symmetric::zeros(transition.nrows()),
        );
        Ok(InformationFilter {
            transition_inverse: inverse_or_zero(&transition, "F"),
            needs_control: !is_zero(&input_control),
            input_control,
            measurement_matrix,
            process_inverse,
            measurement_inverse,
            noise: Box::new(noise),
            previous: initial.clone(),
            initial,
            step: 0,
        })
    }

    /// Creates a filter from an initial state and covariance.
    ///
    /// The initial information matrix is `P0⁻¹` (zero when `P0` is singular) and the initial
    /// information vector is `P0⁻¹·x0`.
    pub fn from_state(
        x0: Vector,
        p0: Symmetric<f64>,
        transition: Matrix,
        input_control: Matrix,
        measurement_matrix: Matrix,
        noise: impl Noise + 'static,
    ) -> Result<Self> {
        check_dims(&x0, &p0, "x0", "P0", DimensionAgreement::RowsToCols)?;
        let information_matrix = symmetric_inverse_or_zero(&*p0, "P0");
        let i0 = information_matrix.dot(&x0);
        Self::new(i0, information_matrix, transition, input_control, measurement_matrix, noise)
    }

    /// Runs one step with measurement `z` and, when the filter has a control matrix, control
    /// input `u`.
    pub fn update(&mut self, z: &Vector, u: Option<&Vector>) -> Result<InformationEstimate> {
        let control = if self.needs_control {
            let u = u.ok_or(FilterError::MissingControl)?;
            check_dims(&self.input_control, u, "G", "u", DimensionAgreement::ColsToRows)?;
            Some(self.input_control.dot(u))
        } else {
            None
        };
        let h = &self.measurement_matrix;
        check_dims(h, z, "H", "z", DimensionAgreement::RowsToRows)?;

        let f_inv_t = self.transition_inverse.t();
        let previous_matrix = &self.previous.information_matrix;

        // M = F⁻ᵀ·I·F⁻¹, B = (M + Q⁻¹)⁻¹
        let m = quadratic_form(&f_inv_t, &**previous_matrix, "F⁻ᵀ", "I")?;
        check_dims(&m, &self.process_inverse, "M", "Q⁻¹", DimensionAgreement::RowsAndCols)?;
        let discount = symmetric_inverse_or_zero(&(&*m + &*self.process_inverse), "M + Q⁻¹");

        // î⁻ = (I − M·B)·(F⁻ᵀ·i + M·G·u)
        let mut propagated = f_inv_t.dot(&self.previous.information_state);
        if let Some(control) = &control {
            propagated += &m.dot(control);
        }
        let predicted_state = &propagated - &m.dot(&discount.dot(&propagated));

        // I⁻ = M − M·B·M
        let predicted_matrix = &*m - &*quadratic_form(&*m, &*discount, "M", "B")?;
        let predicted_matrix = as_symmetric(&predicted_matrix)?;

        let draw = self.noise.measurement(self.step)?;
        check_dims(&draw, h, "v", "H", DimensionAgreement::RowsToRows)?;
        let measurement = h.dot(self.previous.state()) + &draw;

        let (state_gain, matrix_gain) = if self.measurement_inverse.size() == 1 {
            let scale = self.measurement_inverse[[0, 0]];
            let contribution = gram(&h.t()).into_inner() * scale;
            (h.t().dot(z) * scale, contribution)
        } else {
            let contribution =
                quadratic_form(&h.t(), &*self.measurement_inverse, "Hᵀ", "R⁻¹")?;
            let htr = h.t().dot(&*self.measurement_inverse);
            (htr.dot(z), contribution.into_inner())
        };

        let information_state = &predicted_state + &state_gain;
        let information_matrix = as_symmetric(&(&*predicted_matrix + &matrix_gain))?;

        let estimate = InformationEstimate::new(
            information_state,
            measurement,
            information_matrix,
            predicted_matrix,
        );
        debug!(step = self.step, control = self.needs_control, "information filter update");
        self.previous = estimate.clone();
        self.step += 1;
        Ok(estimate)
    }

    /// Returns to the initial estimate and step zero and rewinds the noise source.
    pub fn reset(&mut self) {
        self.previous = self.initial.clone();
        self.step = 0;
        self.noise.reset();
    }

    /// The stored inverse of the transition matrix, `F⁻¹`.
    pub fn state_transition_inverse(&self) -> &Matrix {
        &self.transition_inverse
    }

    pub fn set_state_transition(&mut self, transition: Matrix) -> Result<()> {
        check_dims(
            &transition,
            &self.initial.information_matrix,
            "F",
            "I0",
            DimensionAgreement::RowsAndCols,
        )?;
        self.transition_inverse = inverse_or_zero(&transition, "F");
        Ok(())
    }

    pub fn input_control(&self) -> &Matrix {
        &self.input_control
    }

    pub fn set_input_control(&mut self, input_control: Matrix) -> Result<()> {
        check_control(&input_control, &self.initial.information_state)?;
        self.needs_control = !is_zero(&input_control);
        self.input_control = input_control;
        Ok(())
    }

    pub fn measurement_matrix(&self) -> &Matrix {
        &self.measurement_matrix
    }

    pub fn set_measurement_matrix(&mut self, measurement_matrix: Matrix) -> Result<()> {
        check_dims(
            &measurement_matrix,
            &self.initial.information_state,
            "H",
            "i0",
            DimensionAgreement::ColsToRows,
        )?;
        check_dims(
            &self.measurement_inverse,
            &measurement_matrix,
            "R",
            "H",
            DimensionAgreement::RowsToRows,
        )?;
        self.measurement_matrix = measurement_matrix;
        Ok(())
    }

    pub fn noise(&self) -> &dyn Noise {
        self.noise.as_ref()
    }

    pub fn noise_mut(&mut self) -> &mut dyn Noise {
        self.noise.as_mut()
    }

    /// Replaces the noise source and re-inverts its `Q` and `R`.
    pub fn set_noise(&mut self, noise: impl Noise + 'static) -> Result<()> {
        check_noise(&noise, &self.transition_inverse, &self.measurement_matrix)?;
        let (process_inverse, measurement_inverse) = invert_noise(&noise);
        self.process_inverse = process_inverse;
        self.measurement_inverse = measurement_inverse;
        self.noise = Box::new(noise);
        Ok(())
    }

    pub fn previous_estimate(&self) -> &InformationEstimate {
        &self.previous
    }

    pub fn initial_estimate(&self) -> &InformationEstimate {
        &self.initial
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Whether updates require a control input, i.e. the control matrix is non-zero.
    pub fn needs_control(&self) -> bool {
        self.needs_control
    }
}

impl fmt::Display for InformationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InformationFilter [k={}, control={}]\n{:?}",
            self.step, self.needs_control, self.noise
        )
    }
}

fn check_control(input_control: &Matrix, state: &Vector) -> Result<()> {
    if input_control.is_empty() {
        return Ok(());
    }
    check_dims(input_control, state, "G", "i0", DimensionAgreement::RowsToRows)
}

fn check_noise<N: Noise + ?Sized>(
    noise: &N,
    transition: &Matrix,
    measurement_matrix: &Matrix,
) -> Result<()> {
    check_dims(&noise.process_matrix(), transition, "Q", "F", DimensionAgreement::RowsAndCols)?;
    check_dims(
        &noise.measurement_matrix(),
        measurement_matrix,
        "R",
        "H",
        DimensionAgreement::RowsToRows,
    )
}

fn invert_noise<N: Noise + ?Sized>(noise: &N) -> (Symmetric<f64>, Symmetric<f64>) {
    (
        symmetric_inverse_or_zero(&*noise.process_matrix(), "Q"),
        symmetric_inverse_or_zero(&*noise.measurement_matrix(), "R"),
    )
}
