// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh as NdLinalgEigh, QR as NdLinalgQR, SVDInto as NdLinalgSVDInto, UPLO};
use std::error::Error;

/// A thread-safe wrapper for backend errors.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues in ascending order, as returned by LAPACK.
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Symmetric eigendecomposition reading the upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError>;
}

/// QR decomposition, returning only the thin Q factor.
pub trait BackendQR {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError>;
}

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    /// Singular values in descending order.
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

pub trait BackendSVD {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError>;
}

/// LAPACK routines through ndarray-linalg. The BLAS/LAPACK provider is picked
/// by the `backend_*` cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(format!(
                "Matrix must be square for eigendecomposition, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )
            .into());
        }
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendQR for NdarrayLinAlgBackend {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        if nrows == 0 || ncols == 0 {
            return Ok(Array2::zeros((nrows, nrows.min(ncols))));
        }
        let (q_factor, _r) = matrix.qr().map_err(to_dyn_error)?;
        Ok(q_factor)
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        if matrix.is_empty() {
            let k_dim = nrows.min(ncols);
            return Ok(SVDOutput {
                u: if compute_u { Some(Array2::zeros((nrows, k_dim))) } else { None },
                s: Array1::zeros(k_dim),
                vt: if compute_v { Some(Array2::zeros((k_dim, ncols))) } else { None },
            });
        }
        let (u, s, vt) = matrix.svd_into(compute_u, compute_v).map_err(to_dyn_error)?;
        Ok(SVDOutput { u, s, vt })
    }
}

/// The backend every numeric module calls through.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider;

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BackendEigh for LinAlgBackendProvider {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
        NdarrayLinAlgBackend.eigh_upper(matrix)
    }
}

impl BackendQR for LinAlgBackendProvider {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.qr_q_factor(matrix)
    }
}

impl BackendSVD for LinAlgBackendProvider {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput, ThreadSafeStdError> {
        NdarrayLinAlgBackend.svd_into(matrix, compute_u, compute_v)
    }
}

/// Sorts eigenpairs by descending eigenvalue and returns them as
/// `(values, vectors-as-columns)`.
pub(crate) fn sorted_descending(output: EighOutput) -> (Array1<f64>, Array2<f64>) {
    let EighOutput { eigenvalues, eigenvectors } = output;
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let values = Array1::from_iter(order.iter().map(|&i| eigenvalues[i]));
    let vectors = eigenvectors.select(ndarray::Axis(1), &order);
    (values, vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn eigh_sorted_descending_reorders_pairs() {
        let m = array![[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 1.0]];
        let out = LinAlgBackendProvider::new().eigh_upper(&m).unwrap();
        let (values, vectors) = sorted_descending(out);
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[[1, 0]].abs(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vectors[[0, 1]].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn qr_q_factor_is_orthonormal() {
        let m = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
        let q = LinAlgBackendProvider::new().qr_q_factor(&m).unwrap();
        assert_eq!(q.dim(), (3, 2));
        let gram = q.t().dot(&q);
        assert_abs_diff_eq!(gram[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(gram[[1, 1]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(gram[[0, 1]], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn svd_of_empty_matrix_is_empty() {
        let out = LinAlgBackendProvider::new()
            .svd_into(Array2::zeros((0, 3)), false, false)
            .unwrap();
        assert_eq!(out.s.len(), 0);
    }
}
