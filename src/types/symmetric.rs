use std::fmt;
use std::ops::Deref;

use ndarray::{Array2, ArrayBase, Data, Ix2, LinalgScalar};

use crate::error::{FilterError, Result};

/// Square matrix known to equal its own transpose.
///
/// A `Symmetric` can only be obtained through [`as_symmetric`], which verifies every
/// off-diagonal pair with exact equality, or through the constructors in this crate that
/// produce symmetric output by construction (identity, zeros and the one-triangle kernels
/// used by the filters). It dereferences to the underlying `Array2` for read-only algebra.
#[derive(Debug, Clone, PartialEq)]
pub struct Symmetric<A>(Array2<A>);

impl<A> Symmetric<A> {
    /// Number of rows (equal to the number of columns).
    pub fn size(&self) -> usize {
        self.0.nrows()
    }

    pub fn into_inner(self) -> Array2<A> {
        self.0
    }

    /// Wraps a matrix the caller has built symmetric by construction.
    pub(crate) fn from_symmetric_unchecked(matrix: Array2<A>) -> Self {
        debug_assert_eq!(matrix.nrows(), matrix.ncols());
        Symmetric(matrix)
    }
}

impl<A: LinalgScalar> Symmetric<A> {
    /// The `n`x`n` zero matrix.
    pub fn zeros(n: usize) -> Self {
        Symmetric(Array2::zeros((n, n)))
    }
}

impl<A> Deref for Symmetric<A> {
    type Target = Array2<A>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<A> AsRef<Array2<A>> for Symmetric<A> {
    fn as_ref(&self) -> &Array2<A> {
        &self.0
    }
}

impl<A: fmt::Display> fmt::Display for Symmetric<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Returns a symmetric copy of `matrix`.
///
/// Fails with `NotSquare` when the matrix is not square and with `NotSymmetric` on the
/// first pair `(i, j)` where `matrix[i][j] != matrix[j][i]`. The comparison is exact: no
/// tolerance is applied and nothing is averaged.
pub fn as_symmetric<A, S>(matrix: &ArrayBase<S, Ix2>) -> Result<Symmetric<A>>
where
    A: LinalgScalar + PartialEq,
    S: Data<Elem = A>,
{
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(FilterError::NotSquare { rows, cols });
    }
    for row in 0..rows {
        for col in (row + 1)..cols {
            if matrix[[row, col]] != matrix[[col, row]] {
                return Err(FilterError::NotSymmetric { row, col });
            }
        }
    }
    Ok(Symmetric(matrix.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    #[test]
    fn symmetric_matrix_is_accepted_unchanged() {
        let m = arr2(&[[4.0, 1.5, -2.0], [1.5, 3.0, 0.25], [-2.0, 0.25, 9.0]]);
        let sym = as_symmetric(&m).unwrap();
        assert_eq!(*sym, m);
        assert_eq!(sym.size(), 3);
    }

    #[test]
    fn asymmetric_matrix_is_rejected() -> std::result::Result<(), String> {
        let m = arr2(&[[1.0, 0.0], [1.0, 1.0]]);
        match as_symmetric(&m) {
            Err(FilterError::NotSymmetric { row: 0, col: 1 }) => Ok(()),
            other => Err(format!("expected NotSymmetric, got {:?}", other)),
        }
    }

    #[test]
    fn non_square_matrix_is_rejected() -> std::result::Result<(), String> {
        let m = Array2::<f64>::ones((2, 3));
        match as_symmetric(&m) {
            Err(FilterError::NotSquare { rows: 2, cols: 3 }) => Ok(()),
            other => Err(format!("expected NotSquare, got {:?}", other)),
        }
    }

    #[test]
    fn tiny_asymmetry_is_not_tolerated() {
        let m = arr2(&[[1.0, 0.1], [0.1 + f64::EPSILON, 1.0]]);
        assert!(as_symmetric(&m).is_err());
    }

    #[test]
    fn empty_matrix_is_symmetric() {
        let m = Array2::<f64>::zeros((0, 0));
        assert_eq!(as_symmetric(&m).unwrap().size(), 0);
    }
}
