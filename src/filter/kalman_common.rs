use cauchy::Scalar;
use ndarray::{Array2, ArrayBase, Data, Ix2};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Inverse, InverseC, Lapack};
use tracing::warn;

use crate::error::{FilterError, Result};
use crate::types::{check_dims, DimensionAgreement, Symmetric};

/// Computes `outer · inner · outerᵀ`.
///
/// Only the upper triangle is evaluated and then mirrored, so the result is symmetric bit for
/// bit. This is what keeps the exact symmetry checks on covariance and information matrices
/// satisfiable after floating-point products.
pub(in crate) fn quadratic_form<A, S>(
    outer: &ArrayBase<S, Ix2>,
    inner: &Array2<A>,
    outer_label: &'static str,
    inner_label: &'static str,
) -> Result<Symmetric<A>>
where
    A: Scalar + Lapack,
    S: Data<Elem = A>,
{
    let (inner_rows, inner_cols) = inner.dim();
    if inner_rows != inner_cols {
        return Err(FilterError::NotSquare {
            rows: inner_rows,
            cols: inner_cols,
        });
    }
    check_dims(outer, inner, outer_label, inner_label, DimensionAgreement::ColsToRows)?;

    let left = outer.dot(inner);
    let n = outer.nrows();
    let mut output = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let value = left.row(i).dot(&outer.row(j));
            output[[i, j]] = value;
            output[[j, i]] = value;
        }
    }
    Ok(Symmetric::from_symmetric_unchecked(output))
}

/// Computes `factor · factorᵀ`, symmetric bit for bit.
pub(in crate) fn gram<A, S>(factor: &ArrayBase<S, Ix2>) -> Symmetric<A>
where
    A: Scalar + Lapack,
    S: Data<Elem = A>,
{
    let n = factor.nrows();
    let mut output = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let value = factor.row(i).dot(&factor.row(j));
            output[[i, j]] = value;
            output[[j, i]] = value;
        }
    }
    Symmetric::from_symmetric_unchecked(output)
}

/// Inverts a symmetric positive definite matrix through its Cholesky factorization.
pub(in crate) fn symmetric_inverse<A, S>(
    matrix: &ArrayBase<S, Ix2>,
) -> std::result::Result<Symmetric<A>, LinalgError>
where
    A: Scalar + Lapack,
    S: Data<Elem = A>,
{
    let mut inverse = matrix.invc()?;
    // LAPACK only guarantees one triangle of the inverse.
    let n = inverse.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            inverse[[j, i]] = inverse[[i, j]];
        }
    }
    Ok(Symmetric::from_symmetric_unchecked(inverse))
}

/// Symmetric inverse of `matrix`, or the zero matrix when it is not invertible.
///
/// The information form has to tolerate singular inputs: a term that cannot be inverted then
/// simply contributes no information. The fallback is logged.
pub(in crate) fn symmetric_inverse_or_zero<A, S>(
    matrix: &ArrayBase<S, Ix2>,
    what: &str,
) -> Symmetric<A>
where
    A: Scalar + Lapack,
    S: Data<Elem = A>,
{
    match symmetric_inverse(matrix) {
        Ok(inverse) => inverse,
        Err(err) => {
            warn!(matrix = what, error = %err, "matrix is not invertible, using zero matrix");
            Symmetric::zeros(matrix.nrows())
        }
    }
}

/// General (LU) inverse of `matrix`, or the zero matrix when it is not invertible.
pub(in crate) fn inverse_or_zero<A, S>(matrix: &ArrayBase<S, Ix2>, what: &str) -> Array2<A>
where
    A: Scalar + Lapack,
    S: Data<Elem = A>,
{
    match matrix.inv() {
        Ok(inverse) => inverse,
        Err(err) => {
            warn!(matrix = what, error = %err, "matrix is not invertible, using zero matrix");
            Array2::zeros(matrix.raw_dim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::as_symmetric;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn quadratic_form_is_exactly_symmetric() {
        let outer = arr2(&[[0.3, 1.7, -2.1], [4.4, 0.01, 3.3], [-0.9, 2.2, 1.1]]);
        let inner = arr2(&[[2.0, 0.1, 0.3], [0.1, 3.0, 0.7], [0.3, 0.7, 5.0]]);
        let result = quadratic_form(&outer, &inner, "A", "P").unwrap();
        as_symmetric(&*result).unwrap();
        let expected = outer.dot(&inner).dot(&outer.t());
        for (a, b) in result.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn quadratic_form_checks_dimensions() {
        let outer = Array2::<f64>::ones((2, 3));
        let inner = Array2::<f64>::eye(2);
        assert!(matches!(
            quadratic_form(&outer, &inner, "A", "P"),
            Err(FilterError::DimensionMismatch { lhs: "A", rhs: "P", .. })
        ));
        assert!(matches!(
            quadratic_form(&outer, &Array2::<f64>::ones((3, 2)), "A", "P"),
            Err(FilterError::NotSquare { rows: 3, cols: 2 })
        ));
    }

    #[test]
    fn rectangular_outer_factor_changes_the_size() {
        let h = arr2(&[[1.0, 0.0, 2.0]]);
        let p = Array2::<f64>::eye(3);
        let result = quadratic_form(&h, &p, "H", "P").unwrap();
        assert_eq!(result.dim(), (1, 1));
        assert_abs_diff_eq!(result[[0, 0]], 5.0);
    }

    #[test]
    fn gram_matches_product_with_transpose() {
        let factor = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let result = gram(&factor);
        assert_eq!(*result, factor.dot(&factor.t()));
    }

    #[test]
    fn singular_matrices_degrade_to_zero() {
        let singular = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert_eq!(*symmetric_inverse_or_zero(&singular, "S"), Array2::<f64>::zeros((2, 2)));
        assert_eq!(inverse_or_zero(&singular, "F"), Array2::<f64>::zeros((2, 2)));
        assert_eq!(
            *symmetric_inverse_or_zero(&Array2::<f64>::zeros((3, 3)), "I"),
            Array2::<f64>::zeros((3, 3))
        );
    }

    #[test]
    fn invertible_matrices_are_inverted() {
        let m = arr2(&[[4.0, 1.0], [1.0, 3.0]]);
        let inverse = symmetric_inverse(&m).unwrap();
        as_symmetric(&*inverse).unwrap();
        let product = m.dot(&*inverse);
        assert_abs_diff_eq!(product[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(product[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(product[[1, 1]], 1.0, epsilon = 1e-12);

        let f = arr2(&[[1.0, 0.5], [0.0, 1.0]]);
        let f_inv = inverse_or_zero(&f, "F");
        for (a, b) in f_inv.iter().zip([1.0, -0.5, 0.0, 1.0].iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}
