//! Matrix utilities shared by every filter: the verified `Symmetric` matrix type, identity
//! construction, zero detection and the dimension checks that precede each algebraic step.

mod aliases;
mod ops;
mod ops_traits;
mod symmetric;

pub use aliases::*;
pub use ops::{check_dims, identity, is_zero, scaled_identity, DimensionAgreement};
pub use ops_traits::Shaped;
pub use symmetric::{as_symmetric, Symmetric};
