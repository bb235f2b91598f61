//! Some parallel implementations of basic sparse linear algebra methods
//! that are used heavily in the algorithms. These need to be fast.

use rayon::prelude::*;

use crate::{CsrMatrix, Vector};

pub fn spmv(a: &CsrMatrix, b: &Vector) -> Vector {
    assert!(a.is_csr());
    assert_eq!(a.cols(), b.len());
    let c: Vec<f64> = (0..a.rows())
        .into_par_iter()
        .map(|i| row_dot(a, i, b))
        .collect();
    Vector::from(c)
}

/// `r = b - A x`, written into `r`.
pub fn residual(a: &CsrMatrix, x: &Vector, b: &Vector, r: &mut Vector) {
    assert!(a.is_csr());
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), b.len());
    assert_eq!(a.rows(), r.len());
    let ax: Vec<f64> = (0..a.rows())
        .into_par_iter()
        .map(|i| row_dot(a, i, x))
        .collect();
    for ((ri, bi), axi) in r.iter_mut().zip(b.iter()).zip(ax) {
        *ri = bi - axi;
    }
}

fn row_dot(a: &CsrMatrix, i: usize, x: &Vector) -> f64 {
    a.outer_view(i)
        .map(|row| row.iter().map(|(j, val)| x[j] * val).sum::<f64>())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::{residual, spmv};
    use crate::utils::laplace_1d;
    use crate::Vector;

    #[test]
    fn laplace_times_ones() {
        let mat = laplace_1d(5);
        let ones = Vector::from_elem(5, 1.0);
        assert_eq!(spmv(&mat, &ones).to_vec(), vec![1.0, 0.0, 0.0, 0.0, 1.0]);

        let mut r = Vector::zeros(5);
        residual(&mat, &ones, &Vector::from_elem(5, 1.0), &mut r);
        assert_eq!(r.to_vec(), vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
