#![crate_name = "rusty_kalman"]
//! The `rusty-kalman` crate contains recursive state estimators of the Kalman family, in two
//! dual formulations:
//!
//! - [`filter::HybridFilter`] works in covariance space. It runs either as a classical (linear)
//!   Kalman filter or, after [`filter::HybridFilter::enable_linearized_mode`], as a linearized
//!   (extended) filter whose transition and measurement Jacobians are supplied before every
//!   step.
//! - [`filter::InformationFilter`] works in information (inverse covariance) space, where
//!   independent measurements add up and total ignorance about the state is an exact zero.
//!
//! Both are driven by a [`noise::Noise`] source that provides the noise covariances and,
//! for simulation, noise draws.
//!
//! ## Numerical contracts
//! Every operation on two operands checks their shapes first and fails with
//! [`error::FilterError::DimensionMismatch`] instead of broadcasting. Covariance and
//! information matrices are carried as [`types::Symmetric`], which can only be obtained from
//! a verified or a structurally symmetric computation.
//!
//! ## Backends
//! Linear algebra is delegated to LAPACK through `ndarray-linalg`. The backend is chosen with
//! one of the crate features `openblas-static` (default), `openblas-system`, `netlib-static`,
//! `netlib-system`, `intel-mkl-static` or `intel-mkl-system`.
pub mod error;
pub mod filter;
pub mod noise;
pub mod pipeline;
pub mod types;

pub use error::{FilterError, Result};
