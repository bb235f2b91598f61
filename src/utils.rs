//! General utilities that don't have a specific home: model problems,
//! matrix loading and a few vector helpers.

use std::path::Path;
use std::time::Duration;

use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::error::{AmgError, Result};
use crate::{CooMatrix, CsrMatrix, Vector};

pub fn random_vec(size: usize) -> Vector {
    Vector::random(size, Uniform::new(-2.0_f64, 2.0_f64))
}

/// Loads a matrix market file as CSR. Entries duplicated by the file are
/// summed.
pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<CsrMatrix> {
    let path = path.as_ref();
    let mat = sprs::io::read_matrix_market::<f64, usize, _>(path)
        .map_err(|err| AmgError::MatrixMarket(format!("{}: {}", path.display(), err)))?
        .to_csr::<usize>();
    trace!(
        "loaded {} with {} rows and {} nnz",
        path.display(),
        mat.rows(),
        mat.nnz()
    );
    Ok(mat)
}

/// Tridiagonal `[-1, 2, -1]` matrix.
pub fn laplace_1d(n: usize) -> CsrMatrix {
    let mut coo = CooMatrix::with_capacity((n, n), 3 * n);
    for i in 0..n {
        if i > 0 {
            coo.add_triplet(i, i - 1, -1.0);
        }
        coo.add_triplet(i, i, 2.0);
        if i + 1 < n {
            coo.add_triplet(i, i + 1, -1.0);
        }
    }
    coo.to_csr()
}

/// Five point stencil on an `nx` by `ny` grid with couplings `-1` in x and
/// `-eps` in y, vertex `ix + nx * iy`. Small `eps` gives strong anisotropy
/// along x.
pub fn laplace_2d(nx: usize, ny: usize, eps: f64) -> CsrMatrix {
    let n = nx * ny;
    let mut coo = CooMatrix::with_capacity((n, n), 5 * n);
    for iy in 0..ny {
        for ix in 0..nx {
            let v = ix + nx * iy;
            if iy > 0 {
                coo.add_triplet(v, v - nx, -eps);
            }
            if ix > 0 {
                coo.add_triplet(v, v - 1, -1.0);
            }
            coo.add_triplet(v, v, 2.0 + 2.0 * eps);
            if ix + 1 < nx {
                coo.add_triplet(v, v + 1, -1.0);
            }
            if iy + 1 < ny {
                coo.add_triplet(v, v + nx, -eps);
            }
        }
    }
    coo.to_csr()
}

pub fn norm(vec: &Vector) -> f64 {
    vec.dot(vec).sqrt()
}

/// Largest `|a_ij - a_ji|` over the stored entries.
pub fn symmetry_defect(mat: &CsrMatrix) -> f64 {
    let mut defect: f64 = 0.0;
    for (i, row) in mat.outer_iterator().enumerate() {
        for (j, &val) in row.iter() {
            let transposed = mat.get(j, i).copied().unwrap_or(0.0);
            defect = defect.max((val - transposed).abs());
        }
    }
    defect
}

pub fn format_duration(duration: &Duration) -> String {
    let seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;
    let seconds = seconds % 60;

    format!(
        "{} hours, {} minutes, {}.{:03} seconds",
        hours, minutes, seconds, millis
    )
}
