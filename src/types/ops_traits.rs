use ndarray::{ArrayBase, Data, Ix1, Ix2};

use super::Symmetric;

/// Anything with a two-dimensional (rows, columns) shape.
///
/// One-dimensional arrays are treated as column vectors, so a vector of length `n` reports
/// the shape `(n, 1)`.
pub trait Shaped {
    fn shape2(&self) -> (usize, usize);
}

impl<S: Data> Shaped for ArrayBase<S, Ix1> {
    fn shape2(&self) -> (usize, usize) {
        (self.len(), 1)
    }
}

impl<S: Data> Shaped for ArrayBase<S, Ix2> {
    fn shape2(&self) -> (usize, usize) {
        self.dim()
    }
}

impl<A> Shaped for Symmetric<A> {
    fn shape2(&self) -> (usize, usize) {
        let n = self.size();
        (n, n)
    }
}

impl<T: Shaped + ?Sized> Shaped for &T {
    fn shape2(&self) -> (usize, usize) {
        (**self).shape2()
    }
}
