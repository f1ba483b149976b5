//! Bridge between `ndarray` matrices and `faer` dense factorizations.
//!
//! Kernel ridge regression builds its regularized Gram matrix with `ndarray`
//! and solves it through a faer Cholesky factor. Views are borrowed without a
//! copy when the ndarray layout allows it.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl<'a> FaerStorage<'a> {
    #[inline]
    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Zero-copy faer view of an ndarray matrix when the memory layout allows it.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let storage = match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => FaerStorage::Borrowed(
                MatRef::from_row_major_slice(slice, array.nrows(), array.ncols()),
            ),
            Some(slice) if array.t().is_standard_layout() => FaerStorage::Borrowed(
                MatRef::from_column_major_slice(slice, array.nrows(), array.ncols()),
            ),
            _ => {
                let (rows, cols) = array.dim();
                FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)]))
            }
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

pub struct FaerCholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl FaerCholeskyFactor {
    /// Solves `A X = rhs` for every column of `rhs`.
    pub fn solve_mat<S: Data<Elem = f64>>(&self, rhs: &ArrayBase<S, Ix2>) -> Array2<f64> {
        let rhs_view = FaerArrayView::new(rhs);
        let sol = self.factor.solve(rhs_view.as_ref());
        mat_to_array(sol.as_ref())
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, FaerLinalgError> {
        let faer_view = FaerArrayView::new(self);
        let factor = faer_view
            .as_ref()
            .llt(side)
            .map_err(FaerLinalgError::Cholesky)?;
        Ok(FaerCholeskyFactor { factor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{ShapeBuilder, array};

    #[test]
    fn cholesky_solves_spd_system() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let expected = array![[1.0, -2.0], [0.5, 0.0], [-1.0, 3.0]];
        let rhs = a.dot(&expected);

        let factor = a.cholesky(Side::Lower).expect("spd matrix factorizes");
        let solved = factor.solve_mat(&rhs);
        for (got, want) in solved.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn column_major_views_are_read_correctly() {
        let fortran = Array2::from_shape_vec((2, 2).f(), vec![2.0, 1.0, 0.0, 5.0])
            .expect("valid shape");
        assert!(!fortran.is_standard_layout());
        let view = FaerArrayView::new(&fortran);
        assert_eq!(view.as_ref()[(1, 0)], 1.0);
        assert_eq!(view.as_ref()[(0, 1)], 0.0);
    }

    #[test]
    fn indefinite_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            a.cholesky(Side::Lower),
            Err(FaerLinalgError::Cholesky(_))
        ));
    }
}
