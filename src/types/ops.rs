use std::fmt;

use ndarray::{Array2, ArrayBase, Data, Dimension, LinalgScalar};

use super::{Shaped, Symmetric};
use crate::error::{FilterError, Result};

/// Relation two operands' shapes must satisfy before they are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionAgreement {
    /// rows(a) == cols(b)
    RowsToCols,
    /// cols(a) == rows(b)
    ColsToRows,
    /// cols(a) == cols(b)
    ColsToCols,
    /// rows(a) == rows(b)
    RowsToRows,
    /// rows(a) == rows(b) and cols(a) == cols(b)
    RowsAndCols,
}

impl DimensionAgreement {
    pub const ALL: [DimensionAgreement; 5] = [
        DimensionAgreement::RowsToCols,
        DimensionAgreement::ColsToRows,
        DimensionAgreement::ColsToCols,
        DimensionAgreement::RowsToRows,
        DimensionAgreement::RowsAndCols,
    ];

    fn holds(self, (a_rows, a_cols): (usize, usize), (b_rows, b_cols): (usize, usize)) -> bool {
        match self {
            DimensionAgreement::RowsToCols => a_rows == b_cols,
            DimensionAgreement::ColsToRows => a_cols == b_rows,
            DimensionAgreement::ColsToCols => a_cols == b_cols,
            DimensionAgreement::RowsToRows => a_rows == b_rows,
            DimensionAgreement::RowsAndCols => a_rows == b_rows && a_cols == b_cols,
        }
    }
}

impl fmt::Display for DimensionAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relation = match self {
            DimensionAgreement::RowsToCols => "rows(a) == cols(b)",
            DimensionAgreement::ColsToRows => "cols(a) == rows(b)",
            DimensionAgreement::ColsToCols => "cols(a) == cols(b)",
            DimensionAgreement::RowsToRows => "rows(a) == rows(b)",
            DimensionAgreement::RowsAndCols => "rows(a) == rows(b) and cols(a) == cols(b)",
        };
        f.write_str(relation)
    }
}

/// Checks that `a` and `b` satisfy `relation`.
///
/// On failure the error names both operands by their labels together with their shapes, so
/// the message points at the offending inputs. Shapes are never coerced.
pub fn check_dims<L, R>(
    a: &L,
    b: &R,
    label_a: &'static str,
    label_b: &'static str,
    relation: DimensionAgreement,
) -> Result<()>
where
    L: Shaped + ?Sized,
    R: Shaped + ?Sized,
{
    let lhs_shape = a.shape2();
    let rhs_shape = b.shape2();
    if relation.holds(lhs_shape, rhs_shape) {
        Ok(())
    } else {
        Err(FilterError::DimensionMismatch {
            lhs: label_a,
            rhs: label_b,
            lhs_shape,
            rhs_shape,
            relation,
        })
    }
}

/// True when the array has no elements or every element is zero.
pub fn is_zero<A, S, D>(array: &ArrayBase<S, D>) -> bool
where
    A: LinalgScalar + PartialEq,
    S: Data<Elem = A>,
    D: Dimension,
{
    array.iter().all(|value| *value == A::zero())
}

/// The `n`x`n` identity matrix.
pub fn identity<A: LinalgScalar>(n: usize) -> Symmetric<A> {
    Symmetric::from_symmetric_unchecked(Array2::eye(n))
}

/// The `n`x`n` identity matrix scaled by `scale`.
pub fn scaled_identity<A: LinalgScalar>(n: usize, scale: A) -> Symmetric<A> {
    Symmetric::from_symmetric_unchecked(Array2::from_diag_elem(n, scale))
}
