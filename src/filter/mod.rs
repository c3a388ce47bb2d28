//! Recursive estimators and the estimates they produce.
pub mod hybrid;
pub mod information;
mod kalman_common;
pub mod traits;

pub use hybrid::{CovarianceEstimate, HybridConfig, HybridFilter, Lock};
pub use information::{InformationEstimate, InformationFilter};
pub use traits::Estimate;
