//! Definition of the `Preconditioner` trait as well as the smoothers
//! implementing it.
//!
//! The contract is shared by the smoothers and the multigrid cycle:
//! `apply(v, d)` improves the approximate solution `v` of `A v = d`.
//! Called with `v = 0` it applies the inverse of the preconditioner to `d`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{AmgError, Result};
use crate::parallel_ops::residual;
use crate::{CsrMatrix, Vector};

pub trait Preconditioner {
    /// Prepares `x` and `b` before an iteration starts.
    fn pre(&mut self, _x: &mut Vector, _b: &mut Vector) {}

    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()>;

    /// Releases whatever `pre` set up.
    fn post(&mut self, _x: &mut Vector) {}
}

impl<P: Preconditioner + ?Sized> Preconditioner for Box<P> {
    fn pre(&mut self, x: &mut Vector, b: &mut Vector) {
        (**self).pre(x, b)
    }

    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        (**self).apply(v, d)
    }

    fn post(&mut self, x: &mut Vector) {
        (**self).post(x)
    }
}

fn diagonal(mat: &CsrMatrix) -> Result<Vector> {
    let mut diag = Vector::zeros(mat.rows());
    for (i, row) in mat.outer_iterator().enumerate() {
        diag[i] = row.get(i).copied().unwrap_or(0.0);
        if diag[i] == 0.0 {
            return Err(AmgError::InvalidMatrix(format!(
                "zero or missing diagonal entry in row {}",
                i
            )));
        }
    }
    Ok(diag)
}

/// Damped Jacobi, `v += ω D⁻¹ (d - A v)`.
pub struct Jacobi {
    mat: Arc<CsrMatrix>,
    inverse_diag: Vector,
    weight: f64,
    r: Vector,
}

impl Jacobi {
    pub const DEFAULT_WEIGHT: f64 = 2.0 / 3.0;

    pub fn new(mat: Arc<CsrMatrix>, weight: f64) -> Result<Self> {
        let inverse_diag = diagonal(&mat)?.mapv(|d| 1.0 / d);
        let r = Vector::zeros(mat.rows());
        Ok(Self {
            mat,
            inverse_diag,
            weight,
            r,
        })
    }
}

impl Preconditioner for Jacobi {
    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        residual(&self.mat, v, d, &mut self.r);
        self.r *= &self.inverse_diag;
        v.scaled_add(self.weight, &self.r);
        Ok(())
    }
}

/// ℓ1 Jacobi: scales the residual by the inverse absolute row sums, which
/// is convergent for any SPD matrix without a damping parameter.
pub struct L1 {
    mat: Arc<CsrMatrix>,
    l1_inverse: Vector,
    r: Vector,
}

impl L1 {
    pub fn new(mat: Arc<CsrMatrix>) -> Result<Self> {
        let l1_inverse: Vec<f64> = mat
            .outer_iterator()
            .map(|row_vec| {
                let row_sum_abs: f64 = row_vec.data().iter().map(|val| val.abs()).sum();
                1.0 / row_sum_abs
            })
            .collect();
        if let Some(row) = l1_inverse.iter().position(|v| !v.is_finite()) {
            return Err(AmgError::InvalidMatrix(format!("row {} is empty", row)));
        }
        let r = Vector::zeros(mat.rows());
        Ok(Self {
            mat,
            l1_inverse: Vector::from(l1_inverse),
            r,
        })
    }
}

impl Preconditioner for L1 {
    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        residual(&self.mat, v, d, &mut self.r);
        self.r *= &self.l1_inverse;
        *v += &self.r;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sweep {
    Forward,
    Backward,
    Symmetric,
}

/// Gauss-Seidel relaxation done in place, row by row.
pub struct GaussSeidel {
    mat: Arc<CsrMatrix>,
    diag: Vector,
    sweep: Sweep,
}

impl GaussSeidel {
    pub fn new(mat: Arc<CsrMatrix>, sweep: Sweep) -> Result<Self> {
        let diag = diagonal(&mat)?;
        Ok(Self { mat, diag, sweep })
    }

    fn relax_row(&self, i: usize, v: &mut Vector, d: &Vector) {
        let mut sum = d[i];
        if let Some(row) = self.mat.outer_view(i) {
            for (j, val) in row.iter() {
                if j != i {
                    sum -= val * v[j];
                }
            }
        }
        v[i] = sum / self.diag[i];
    }

    fn forward(&self, v: &mut Vector, d: &Vector) {
        for i in 0..self.mat.rows() {
            self.relax_row(i, v, d);
        }
    }

    fn backward(&self, v: &mut Vector, d: &Vector) {
        for i in (0..self.mat.rows()).rev() {
            self.relax_row(i, v, d);
        }
    }
}

impl Preconditioner for GaussSeidel {
    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        match self.sweep {
            Sweep::Forward => self.forward(v, d),
            Sweep::Backward => self.backward(v, d),
            Sweep::Symmetric => {
                self.forward(v, d);
                self.backward(v, d);
            }
        }
        Ok(())
    }
}

/// Builds one smoother per level from that level's matrix.
pub trait SmootherFactory {
    type Smoother: Preconditioner;

    fn make_smoother(&self, mat: Arc<CsrMatrix>) -> Result<Self::Smoother>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum SmootherType {
    Jacobi,
    L1,
    #[strum(serialize = "fgs", serialize = "forwardgaussseidel")]
    ForwardGaussSeidel,
    #[strum(serialize = "bgs", serialize = "backwardgaussseidel")]
    BackwardGaussSeidel,
    #[strum(serialize = "sgs", serialize = "symmetricgaussseidel")]
    SymmetricGaussSeidel,
}

impl Default for SmootherType {
    fn default() -> Self {
        SmootherType::SymmetricGaussSeidel
    }
}

/// Any of the built in smoothers, as chosen by a [`SmootherType`].
pub enum Smoother {
    Jacobi(Jacobi),
    L1(L1),
    GaussSeidel(GaussSeidel),
}

impl Preconditioner for Smoother {
    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        match self {
            Smoother::Jacobi(s) => s.apply(v, d),
            Smoother::L1(s) => s.apply(v, d),
            Smoother::GaussSeidel(s) => s.apply(v, d),
        }
    }
}

impl SmootherFactory for SmootherType {
    type Smoother = Smoother;

    fn make_smoother(&self, mat: Arc<CsrMatrix>) -> Result<Smoother> {
        Ok(match self {
            SmootherType::Jacobi => Smoother::Jacobi(Jacobi::new(mat, Jacobi::DEFAULT_WEIGHT)?),
            SmootherType::L1 => Smoother::L1(L1::new(mat)?),
            SmootherType::ForwardGaussSeidel => {
                Smoother::GaussSeidel(GaussSeidel::new(mat, Sweep::Forward)?)
            }
            SmootherType::BackwardGaussSeidel => {
                Smoother::GaussSeidel(GaussSeidel::new(mat, Sweep::Backward)?)
            }
            SmootherType::SymmetricGaussSeidel => {
                Smoother::GaussSeidel(GaussSeidel::new(mat, Sweep::Symmetric)?)
            }
        })
    }
}
