//! Iterative drivers around a [`Preconditioner`] and the solvers used on
//! the coarsest level of a hierarchy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sprs::SymmetryCheck;
use sprs_ldl::Ldl;
use strum_macros::{Display, EnumString};

use crate::error::{AmgError, Result};
use crate::parallel_ops::{residual, spmv};
use crate::preconditioner::{Preconditioner, L1};
use crate::utils::norm;
use crate::{Cholesky, CsrMatrix, Vector};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SolveInfo {
    pub converged: bool,
    pub iterations: usize,
    pub initial_residual_norm: f64,
    pub final_relative_residual_norm: f64,
    pub relative_residual_norm_history: Vec<f64>,
}

impl SolveInfo {
    fn new(initial_residual_norm: f64) -> Self {
        Self {
            initial_residual_norm,
            final_relative_residual_norm: 1.0,
            relative_residual_norm_history: vec![1.0],
            ..Default::default()
        }
    }

    fn record(&mut self, iteration: usize, relative: f64) {
        self.iterations = iteration;
        self.final_relative_residual_norm = relative;
        self.relative_residual_norm_history.push(relative);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum IterativeMethod {
    #[strum(serialize = "pcg", serialize = "conjugategradient")]
    ConjugateGradient,
    #[strum(serialize = "stationary", serialize = "stationaryiteration")]
    StationaryIteration,
}

/// Stationary iterative method based on the preconditioner. Solves the
/// system Ax = b for x where 'mat' is A and 'rhs' is b; every iteration is
/// one `apply` of the preconditioner on the current iterate. Stops once the
/// residual is reduced by `epsilon` relative to the initial residual.
pub fn stationary<P>(
    mat: &CsrMatrix,
    rhs: &Vector,
    initial_iterate: &Vector,
    max_iter: usize,
    epsilon: f64,
    preconditioner: &mut P,
) -> Result<(Vector, SolveInfo)>
where
    P: Preconditioner + ?Sized,
{
    check_dims(mat, rhs, initial_iterate)?;
    let mut x = initial_iterate.clone();
    let mut b = rhs.clone();
    preconditioner.pre(&mut x, &mut b);

    let mut r = Vector::zeros(b.len());
    residual(mat, &x, &b, &mut r);
    let r0_norm = norm(&r);
    let mut info = SolveInfo::new(r0_norm);

    if r0_norm == 0.0 {
        info.converged = true;
        info.final_relative_residual_norm = 0.0;
        preconditioner.post(&mut x);
        return Ok((x, info));
    }

    for iter in 1..=max_iter {
        preconditioner.apply(&mut x, &b)?;
        residual(mat, &x, &b, &mut r);
        let relative = norm(&r) / r0_norm;
        info.record(iter, relative);

        if iter % 50 == 0 {
            trace!("relative residual iter {iter}: {relative:.3e}");
        }

        if relative < epsilon {
            info!("converged in {iter} iterations");
            info.converged = true;
            break;
        }
    }

    if !info.converged {
        warn!(
            "stationary iteration did not converge in {} iterations, relative residual {:.3e}",
            max_iter, info.final_relative_residual_norm
        );
    }
    preconditioner.post(&mut x);
    Ok((x, info))
}

/// Preconditioned conjugate gradient. Solves the system Ax = b for x where
/// 'mat' is A and 'rhs' is b. The preconditioner is applied to each
/// residual starting from a zero vector, so it has to be symmetric.
pub fn pcg<P>(
    mat: &CsrMatrix,
    rhs: &Vector,
    initial_iterate: &Vector,
    max_iter: usize,
    epsilon: f64,
    preconditioner: &mut P,
) -> Result<(Vector, SolveInfo)>
where
    P: Preconditioner + ?Sized,
{
    check_dims(mat, rhs, initial_iterate)?;
    let mut x = initial_iterate.clone();
    let mut b = rhs.clone();
    preconditioner.pre(&mut x, &mut b);

    let mut r = Vector::zeros(b.len());
    residual(mat, &x, &b, &mut r);
    let r0_norm = norm(&r);
    let mut info = SolveInfo::new(r0_norm);

    if r0_norm == 0.0 {
        info.converged = true;
        info.final_relative_residual_norm = 0.0;
        preconditioner.post(&mut x);
        return Ok((x, info));
    }

    let mut r_bar = Vector::zeros(b.len());
    preconditioner.apply(&mut r_bar, &r)?;
    let mut d = r.dot(&r_bar);
    let mut p = r_bar.clone();

    for iter in 1..=max_iter {
        let g = spmv(mat, &p);
        let alpha = d / p.dot(&g);
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &g);

        let relative = norm(&r) / r0_norm;
        info.record(iter, relative);

        if iter % 50 == 0 {
            trace!("relative residual iter {iter}: {relative:.3e}");
        }

        if relative < epsilon {
            info!("converged in {iter} iterations");
            info.converged = true;
            break;
        }

        r_bar.fill(0.0);
        preconditioner.apply(&mut r_bar, &r)?;
        let d_old = d;
        d = r.dot(&r_bar);

        let beta = d / d_old;
        p *= beta;
        p += &r_bar;
    }

    if !info.converged {
        warn!(
            "pcg did not converge in {} iterations, relative residual {:.3e}",
            max_iter, info.final_relative_residual_norm
        );
    }
    preconditioner.post(&mut x);
    Ok((x, info))
}

fn check_dims(mat: &CsrMatrix, rhs: &Vector, initial_iterate: &Vector) -> Result<()> {
    for len in [rhs.len(), initial_iterate.len()] {
        if len != mat.rows() {
            return Err(AmgError::DimensionMismatch {
                expected: mat.rows(),
                actual: len,
            });
        }
    }
    Ok(())
}

/// Solver for the coarsest level of a hierarchy.
pub trait CoarseSolver {
    /// Solves `A x = rhs`, overwriting `x`.
    fn solve(&mut self, rhs: &Vector, x: &mut Vector) -> Result<()>;
}

/// Sparse LDLᵀ factorization of the coarse matrix, computed once.
pub struct Direct {
    ldl: Cholesky,
    dim: usize,
}

impl Direct {
    pub fn new(mat: &CsrMatrix) -> Result<Self> {
        let ldl = Ldl::new()
            .check_symmetry(SymmetryCheck::DontCheckSymmetry)
            .numeric(mat.view())
            .map_err(|err| AmgError::DirectSolver(format!("factorization failed: {:?}", err)))?;
        trace!("factorized coarse matrix with {} rows", mat.rows());
        Ok(Self {
            ldl,
            dim: mat.rows(),
        })
    }
}

impl CoarseSolver for Direct {
    fn solve(&mut self, rhs: &Vector, x: &mut Vector) -> Result<()> {
        if rhs.len() != self.dim {
            return Err(AmgError::DimensionMismatch {
                expected: self.dim,
                actual: rhs.len(),
            });
        }
        let solution = self.ldl.solve(rhs.to_vec());
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(AmgError::DirectSolver("coarse matrix is singular".into()));
        }
        *x = Vector::from(solution);
        Ok(())
    }
}

/// Solves the coarse problem "almost exactly" with ℓ1 preconditioned CG.
/// Useful when the coarsest matrix is too large to factorize. Not reaching
/// `tolerance` within `max_iter` iterations is an error, the cycle never
/// continues with an inexact coarse correction.
pub struct IterativeCoarse {
    mat: Arc<CsrMatrix>,
    preconditioner: L1,
    max_iter: usize,
    tolerance: f64,
}

impl IterativeCoarse {
    pub fn new(mat: Arc<CsrMatrix>, max_iter: usize, tolerance: f64) -> Result<Self> {
        let preconditioner = L1::new(mat.clone())?;
        Ok(Self {
            mat,
            preconditioner,
            max_iter,
            tolerance,
        })
    }
}

impl CoarseSolver for IterativeCoarse {
    fn solve(&mut self, rhs: &Vector, x: &mut Vector) -> Result<()> {
        let zeros = Vector::zeros(self.mat.rows());
        let (solution, info) = pcg(
            &self.mat,
            rhs,
            &zeros,
            self.max_iter,
            self.tolerance,
            &mut self.preconditioner,
        )?;
        if !info.converged {
            return Err(AmgError::DirectSolver(format!(
                "iterative coarse solve stopped at relative residual {:.3e} after {} iterations",
                info.final_relative_residual_norm, info.iterations
            )));
        }
        *x = solution;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum CoarseSolverType {
    Direct,
    Iterative,
}

impl Default for CoarseSolverType {
    fn default() -> Self {
        CoarseSolverType::Direct
    }
}

impl CoarseSolverType {
    pub fn build(&self, mat: Arc<CsrMatrix>) -> Result<Box<dyn CoarseSolver>> {
        Ok(match self {
            CoarseSolverType::Direct => Box::new(Direct::new(&mat)?),
            CoarseSolverType::Iterative => {
                let max_iter = 10 * mat.rows().max(10);
                Box::new(IterativeCoarse::new(mat, max_iter, 1e-10)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;

    use super::{pcg, stationary, CoarseSolver, CoarseSolverType, IterativeCoarse};
    use crate::error::AmgError;
    use crate::parallel_ops::spmv;
    use crate::preconditioner::{SmootherFactory, SmootherType};
    use crate::utils::{laplace_1d, laplace_2d, random_vec};
    use crate::{CooMatrix, CsrMatrix, Vector};

    #[test]
    fn pcg_solves_laplace() {
        let mat = Arc::new(laplace_2d(10, 10, 1.0));
        let solution = random_vec(mat.rows());
        let b = spmv(&mat, &solution);
        let mut pc = SmootherType::SymmetricGaussSeidel
            .make_smoother(mat.clone())
            .unwrap();
        let (x, info) = pcg(&mat, &b, &Vector::zeros(100), 200, 1e-10, &mut pc).unwrap();
        assert!(info.converged);
        assert_eq!(info.relative_residual_norm_history.len(), info.iterations + 1);
        for (xi, si) in x.iter().zip(solution.iter()) {
            assert_abs_diff_eq!(xi, si, epsilon = 1e-6);
        }
    }

    #[test]
    fn stationary_gauss_seidel_converges() {
        let mat = Arc::new(laplace_1d(10));
        let b = Vector::from_elem(10, 1.0);
        let mut pc = SmootherType::SymmetricGaussSeidel
            .make_smoother(mat.clone())
            .unwrap();
        let (x, info) = stationary(&mat, &b, &Vector::zeros(10), 1000, 1e-8, &mut pc).unwrap();
        assert!(info.converged);
        let r = &b - &spmv(&mat, &x);
        assert!(r.iter().all(|v| v.abs() < 1e-7));
    }

    #[test]
    fn zero_rhs_is_solved_immediately() {
        let mat = Arc::new(laplace_1d(4));
        let mut pc = SmootherType::L1.make_smoother(mat.clone()).unwrap();
        let zeros = Vector::zeros(4);
        let (x, info) = pcg(&mat, &zeros, &zeros, 10, 1e-8, &mut pc).unwrap();
        assert!(info.converged);
        assert_eq!(info.iterations, 0);
        assert!(x.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mismatched_rhs_is_rejected() {
        let mat = Arc::new(laplace_1d(4));
        let mut pc = SmootherType::L1.make_smoother(mat.clone()).unwrap();
        assert!(pcg(&mat, &Vector::zeros(3), &Vector::zeros(4), 10, 1e-8, &mut pc).is_err());
    }

    #[test]
    fn coarse_solvers_agree() {
        let mat = Arc::new(laplace_2d(5, 4, 0.5));
        let solution = random_vec(mat.rows());
        let b = spmv(&mat, &solution);

        for solver_type in [CoarseSolverType::Direct, CoarseSolverType::Iterative] {
            let mut solver = solver_type.build(mat.clone()).unwrap();
            let mut x = Vector::zeros(mat.rows());
            solver.solve(&b, &mut x).unwrap();
            for (xi, si) in x.iter().zip(solution.iter()) {
                assert_abs_diff_eq!(xi, si, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn singular_coarse_matrix_fails_to_factorize() {
        let mut coo = CooMatrix::new((2, 2));
        for i in 0..2 {
            for j in 0..2 {
                coo.add_triplet(i, j, 1.0);
            }
        }
        let mat: CsrMatrix = coo.to_csr();
        let mat = Arc::new(mat);
        assert!(matches!(
            CoarseSolverType::Direct.build(mat),
            Err(AmgError::DirectSolver(_))
        ));
    }

    #[test]
    fn unconverged_iterative_coarse_solve_is_an_error() {
        let mat = Arc::new(laplace_2d(5, 4, 0.5));
        let b = random_vec(mat.rows());
        let mut solver = IterativeCoarse::new(mat.clone(), 1, 1e-12).unwrap();
        let mut x = Vector::zeros(mat.rows());
        assert!(matches!(
            solver.solve(&b, &mut x),
            Err(AmgError::DirectSolver(_))
        ));
    }
}
