//! The multigrid cycle as a [`Preconditioner`].
//!
//! `apply(v, d)` on level ℓ pre-smooths, restricts the defect, recurses on
//! level ℓ + 1 with a zero initial correction, prolongs the correction back
//! and post-smooths. A W-cycle repeats that sequence twice per level. The
//! coarsest level is solved by a [`CoarseSolver`].

use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{AmgError, Result};
use crate::hierarchy::{Hierarchy, MatrixHierarchy};
use crate::interpolation::Transfer;
use crate::parallel_ops::residual;
use crate::preconditioner::{Preconditioner, SmootherFactory};
use crate::solver::{CoarseSolver, CoarseSolverType};
use crate::{CsrMatrix, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum CycleType {
    V,
    W,
}

impl CycleType {
    /// Number of coarse grid corrections per visit of a level.
    pub fn gamma(&self) -> usize {
        match self {
            CycleType::V => 1,
            CycleType::W => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleParams {
    pub cycle: CycleType,
    pub pre_smoothing: usize,
    pub post_smoothing: usize,
    pub coarse_solver: CoarseSolverType,
}

impl Default for CycleParams {
    fn default() -> Self {
        Self {
            cycle: CycleType::V,
            pre_smoothing: 1,
            post_smoothing: 1,
            coarse_solver: CoarseSolverType::Direct,
        }
    }
}

impl CycleParams {
    pub fn with_cycle(mut self, cycle: CycleType) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_smoothing_steps(mut self, pre: usize, post: usize) -> Self {
        self.pre_smoothing = pre;
        self.post_smoothing = post;
        self
    }

    pub fn with_coarse_solver(mut self, coarse_solver: CoarseSolverType) -> Self {
        self.coarse_solver = coarse_solver;
        self
    }
}

/// Algebraic multigrid preconditioner over a [`MatrixHierarchy`].
pub struct Amg<F: SmootherFactory> {
    hierarchy: MatrixHierarchy,
    factory: F,
    params: CycleParams,
    smoothers: Hierarchy<F::Smoother>,
    coarse_solver: Option<Box<dyn CoarseSolver>>,
    lhs: Hierarchy<Vector>,
    rhs: Hierarchy<Vector>,
    defect: Hierarchy<Vector>,
}

impl<F: SmootherFactory> Amg<F> {
    pub fn new(hierarchy: MatrixHierarchy, factory: F, params: CycleParams) -> Result<Self> {
        let smoothers = hierarchy.smoothers(&factory)?;
        let coarse_solver = Self::build_coarse_solver(&hierarchy, &params)?;
        let fine_dim = hierarchy.get_mat(0).rows();
        let lhs = hierarchy.coarsen_vector(&Vector::zeros(fine_dim))?;
        let rhs = lhs.clone();
        let defect = lhs.clone();
        trace!(
            "built {}-cycle with {} levels, smoothing ({}, {})",
            params.cycle,
            hierarchy.levels(),
            params.pre_smoothing,
            params.post_smoothing
        );

        Ok(Self {
            hierarchy,
            factory,
            params,
            smoothers,
            coarse_solver,
            lhs,
            rhs,
            defect,
        })
    }

    fn build_coarse_solver(
        hierarchy: &MatrixHierarchy,
        params: &CycleParams,
    ) -> Result<Option<Box<dyn CoarseSolver>>> {
        if hierarchy.levels() == 1 {
            return Ok(None);
        }
        let coarsest = hierarchy.get_mat(hierarchy.levels() - 1);
        params.coarse_solver.build(coarsest).map(Some)
    }

    pub fn hierarchy(&self) -> &MatrixHierarchy {
        &self.hierarchy
    }

    pub fn params(&self) -> &CycleParams {
        &self.params
    }

    /// Swaps in a fine matrix with unchanged sparsity: recomputes the
    /// coarse operators with the existing aggregates and rebuilds the
    /// smoothers and the coarse solver.
    pub fn update_matrix(&mut self, mat: Arc<CsrMatrix>) -> Result<()> {
        self.hierarchy.recalculate_galerkin(mat)?;
        self.smoothers = self.hierarchy.smoothers(&self.factory)?;
        self.coarse_solver = Self::build_coarse_solver(&self.hierarchy, &self.params)?;
        Ok(())
    }

    fn transfer(&self, level: usize) -> Result<&Transfer> {
        self.hierarchy.transfer(level).ok_or_else(|| {
            AmgError::InvalidMatrix(format!("level {} has no transfer operator", level))
        })
    }

    fn smooth(&mut self, level: usize, steps: usize, v: &mut Vector, d: &Vector) -> Result<()> {
        for _ in 0..steps {
            self.smoothers[level].apply(v, d)?;
        }
        Ok(())
    }

    fn mgc(&mut self, level: usize, v: &mut Vector, d: &Vector) -> Result<()> {
        if level + 1 == self.hierarchy.levels() {
            let solver = self.coarse_solver.as_mut().ok_or_else(|| {
                AmgError::DirectSolver("no coarse solver for the coarsest level".into())
            })?;
            return solver.solve(d, v);
        }

        let mat = self.hierarchy.get_mat(level);
        for _ in 0..self.params.cycle.gamma() {
            self.smooth(level, self.params.pre_smoothing, v, d)?;

            let mut r = mem::replace(&mut self.defect[level], Vector::zeros(0));
            let mut coarse_d = mem::replace(&mut self.rhs[level + 1], Vector::zeros(0));
            let mut coarse_v = mem::replace(&mut self.lhs[level + 1], Vector::zeros(0));

            residual(&mat, v, d, &mut r);
            let result = self.transfer(level).map(|t| t.restrict(&r, &mut coarse_d));
            let result = result.and_then(|_| {
                self.hierarchy.exchange_overlap(level + 1, &mut coarse_d);
                coarse_v.fill(0.0);
                self.mgc(level + 1, &mut coarse_v, &coarse_d)
            });
            let result =
                result.and_then(|_| self.transfer(level).map(|t| t.prolong_add(&coarse_v, v)));

            self.defect[level] = r;
            self.rhs[level + 1] = coarse_d;
            self.lhs[level + 1] = coarse_v;
            result?;

            self.smooth(level, self.params.post_smoothing, v, d)?;
        }
        Ok(())
    }
}

impl<F: SmootherFactory> Preconditioner for Amg<F> {
    fn pre(&mut self, x: &mut Vector, b: &mut Vector) {
        self.smoothers.finest_mut().pre(x, b);
    }

    fn apply(&mut self, v: &mut Vector, d: &Vector) -> Result<()> {
        let n = self.hierarchy.get_mat(0).rows();
        for len in [v.len(), d.len()] {
            if len != n {
                return Err(AmgError::DimensionMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }

        if self.hierarchy.levels() == 1 {
            let steps = self.params.pre_smoothing + self.params.post_smoothing;
            return self.smooth(0, steps, v, d);
        }
        self.mgc(0, v, d)
    }

    fn post(&mut self, x: &mut Vector) {
        self.smoothers.finest_mut().post(x);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;

    use super::{Amg, CycleParams, CycleType};
    use crate::criterion::CoarseningCriterion;
    use crate::error::{AmgError, Result};
    use crate::hierarchy::{HierarchyBuilder, MatrixHierarchy};
    use crate::ownership::{OverlapSet, Ownership};
    use crate::parallel_ops::spmv;
    use crate::preconditioner::{Preconditioner, SmootherFactory, SmootherType};
    use crate::solver::{pcg, stationary, CoarseSolver, CoarseSolverType};
    use crate::utils::{laplace_1d, laplace_2d, random_vec};
    use crate::{CsrMatrix, Vector};

    #[derive(Default)]
    struct Counts {
        apply: Cell<usize>,
        pre: Cell<usize>,
        post: Cell<usize>,
    }

    struct Counting(Rc<Counts>);

    impl Preconditioner for Counting {
        fn pre(&mut self, _x: &mut Vector, _b: &mut Vector) {
            self.0.pre.set(self.0.pre.get() + 1);
        }

        fn apply(&mut self, _v: &mut Vector, _d: &Vector) -> Result<()> {
            self.0.apply.set(self.0.apply.get() + 1);
            Ok(())
        }

        fn post(&mut self, _x: &mut Vector) {
            self.0.post.set(self.0.post.get() + 1);
        }
    }

    struct CountingFactory(Rc<Counts>);

    impl SmootherFactory for CountingFactory {
        type Smoother = Counting;

        fn make_smoother(&self, _mat: Arc<CsrMatrix>) -> Result<Counting> {
            Ok(Counting(self.0.clone()))
        }
    }

    struct FailingCoarse(Rc<Cell<usize>>);

    impl CoarseSolver for FailingCoarse {
        fn solve(&mut self, _rhs: &Vector, _x: &mut Vector) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Err(AmgError::DirectSolver("singular".into()))
        }
    }

    /// Records `(level, length)` of every exchanged vector.
    #[derive(Clone, Default)]
    struct RecordingOwnership(Arc<Mutex<Vec<(usize, usize)>>>);

    impl Ownership for RecordingOwnership {
        fn is_owned(&self, _vertex: usize) -> bool {
            true
        }

        fn exchange_overlap(&self, level: usize, values: &mut Vector) {
            self.0.lock().unwrap().push((level, values.len()));
        }
    }

    fn laplace_amg(params: CycleParams) -> (Arc<CsrMatrix>, Amg<SmootherType>) {
        let mat = Arc::new(laplace_2d(16, 16, 1.0));
        let criterion = CoarseningCriterion::new().with_coarsen_target(10);
        let hierarchy = MatrixHierarchy::build(mat.clone(), &criterion).unwrap();
        assert!(hierarchy.levels() > 2);
        let amg = Amg::new(hierarchy, SmootherType::SymmetricGaussSeidel, params).unwrap();
        (mat, amg)
    }

    #[test]
    fn one_level_hierarchy_only_smooths() {
        let mat = Arc::new(laplace_1d(20));
        let hierarchy = MatrixHierarchy::build(mat, &CoarseningCriterion::default()).unwrap();
        assert_eq!(hierarchy.levels(), 1);

        let counts = Rc::new(Counts::default());
        let params = CycleParams::default().with_smoothing_steps(2, 3);
        let mut amg = Amg::new(hierarchy, CountingFactory(counts.clone()), params).unwrap();

        let mut x = Vector::zeros(20);
        let mut b = Vector::from_elem(20, 1.0);
        amg.pre(&mut x, &mut b);
        amg.apply(&mut x, &b).unwrap();
        amg.post(&mut x);
        assert_eq!(counts.apply.get(), 5);
        assert_eq!(counts.pre.get(), 1);
        assert_eq!(counts.post.get(), 1);
    }

    #[test]
    fn smoother_calls_per_cycle() {
        let mat = Arc::new(laplace_2d(16, 16, 1.0));
        let criterion = CoarseningCriterion::new().with_coarsen_target(10);
        let hierarchy = MatrixHierarchy::build(mat, &criterion).unwrap();
        let smoothed_levels = hierarchy.levels() - 1;

        let counts = Rc::new(Counts::default());
        let params = CycleParams::default().with_smoothing_steps(2, 1);
        let mut amg = Amg::new(hierarchy, CountingFactory(counts.clone()), params).unwrap();
        let mut v = Vector::zeros(256);
        amg.apply(&mut v, &Vector::from_elem(256, 1.0)).unwrap();
        assert_eq!(counts.apply.get(), 3 * smoothed_levels);
    }

    #[test]
    fn w_cycle_visits_every_level_twice_per_parent_visit() {
        let mat = Arc::new(laplace_2d(16, 16, 1.0));
        let criterion = CoarseningCriterion::new().with_coarsen_target(10);
        let hierarchy = MatrixHierarchy::build(mat, &criterion).unwrap();
        assert_eq!(hierarchy.levels(), 3);

        let counts = Rc::new(Counts::default());
        let params = CycleParams::default().with_cycle(CycleType::W);
        let mut amg = Amg::new(hierarchy, CountingFactory(counts.clone()), params).unwrap();
        let mut v = Vector::zeros(256);
        amg.apply(&mut v, &Vector::from_elem(256, 1.0)).unwrap();
        // level 0: 2 repetitions * 2 sweeps, level 1: 2 visits * 2 repetitions * 2 sweeps
        assert_eq!(counts.apply.get(), 12);
    }

    #[test]
    fn restricted_defects_are_exchanged_on_their_level() {
        let mat = Arc::new(laplace_2d(16, 16, 1.0));
        let criterion = CoarseningCriterion::new().with_coarsen_target(10);
        let ownership = RecordingOwnership::default();
        let hierarchy = HierarchyBuilder::new(criterion)
            .with_ownership(ownership.clone())
            .build(mat)
            .unwrap();
        let dims = hierarchy.get_dims();
        assert!(ownership.0.lock().unwrap().is_empty());

        let mut amg =
            Amg::new(hierarchy, SmootherType::SymmetricGaussSeidel, CycleParams::default())
                .unwrap();
        let mut v = Vector::zeros(256);
        amg.apply(&mut v, &random_vec(256)).unwrap();

        let expected: Vec<(usize, usize)> = (1..dims.len()).map(|l| (l, dims[l])).collect();
        assert!(expected.len() >= 2);
        assert_eq!(*ownership.0.lock().unwrap(), expected);
    }

    #[test]
    fn coarse_solver_error_is_returned_unchanged() {
        let (mat, mut amg) = laplace_amg(CycleParams::default());
        let calls = Rc::new(Cell::new(0));
        amg.coarse_solver = Some(Box::new(FailingCoarse(calls.clone())));

        let d = random_vec(256);
        let mut v = Vector::zeros(256);
        assert!(matches!(
            amg.apply(&mut v, &d),
            Err(AmgError::DirectSolver(msg)) if msg == "singular"
        ));
        assert_eq!(calls.get(), 1);

        // work vectors survive the failed cycle
        amg.update_matrix(mat).unwrap();
        let mut v = Vector::zeros(256);
        amg.apply(&mut v, &d).unwrap();
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn zero_defect_gives_zero_correction() {
        for cycle in [CycleType::V, CycleType::W] {
            let (_, mut amg) = laplace_amg(CycleParams::default().with_cycle(cycle));
            let mut v = Vector::zeros(256);
            amg.apply(&mut v, &Vector::zeros(256)).unwrap();
            assert!(v.iter().all(|x| *x == 0.0));
        }
    }

    #[test]
    fn v_cycle_is_symmetric() {
        let (_, mut amg) = laplace_amg(CycleParams::default());
        for _ in 0..3 {
            let u = random_vec(256);
            let w = random_vec(256);
            let mut mu = Vector::zeros(256);
            let mut mw = Vector::zeros(256);
            amg.apply(&mut mu, &u).unwrap();
            amg.apply(&mut mw, &w).unwrap();
            assert_relative_eq!(w.dot(&mu), u.dot(&mw), max_relative = 1e-8, epsilon = 1e-10);
        }
    }

    #[test]
    fn amg_pcg_converges() {
        for cycle in [CycleType::V, CycleType::W] {
            let (mat, mut amg) = laplace_amg(CycleParams::default().with_cycle(cycle));
            let b = random_vec(256);
            let (x, info) = pcg(&mat, &b, &Vector::zeros(256), 100, 1e-8, &mut amg).unwrap();
            assert!(info.converged, "{} cycle: {:?}", cycle, info);
            let r = &b - &spmv(&mat, &x);
            assert!(r.dot(&r).sqrt() < 1e-7 * b.dot(&b).sqrt());
        }
    }

    #[test]
    fn w_cycle_stationary_iteration_converges() {
        let params = CycleParams::default()
            .with_cycle(CycleType::W)
            .with_smoothing_steps(2, 2);
        let (mat, mut amg) = laplace_amg(params);
        let b = random_vec(256);
        let (_, info) = stationary(&mat, &b, &Vector::zeros(256), 500, 1e-6, &mut amg).unwrap();
        assert!(info.converged);
    }

    #[test]
    fn iterative_coarse_solver_works_too() {
        let params = CycleParams::default().with_coarse_solver(CoarseSolverType::Iterative);
        let (mat, mut amg) = laplace_amg(params);
        let b = random_vec(256);
        let (_, info) = pcg(&mat, &b, &Vector::zeros(256), 100, 1e-8, &mut amg).unwrap();
        assert!(info.converged);
    }

    #[test]
    fn update_matrix_rescales_the_cycle() {
        let (mat, mut amg) = laplace_amg(CycleParams::default());
        let d = random_vec(256);
        let mut before = Vector::zeros(256);
        amg.apply(&mut before, &d).unwrap();

        amg.update_matrix(Arc::new(mat.map(|v| 3.0 * v))).unwrap();
        let mut after = Vector::zeros(256);
        amg.apply(&mut after, &d).unwrap();
        for (b, a) in before.iter().zip(after.iter()) {
            assert_relative_eq!(*b, 3.0 * a, max_relative = 1e-9, epsilon = 1e-12);
        }
    }

    #[test]
    fn overlap_hierarchy_still_preconditions() {
        let mat = Arc::new(laplace_2d(16, 16, 1.0));
        let criterion = CoarseningCriterion::new().with_coarsen_target(10);
        let hierarchy = HierarchyBuilder::new(criterion)
            .with_ownership(OverlapSet::new(0..16))
            .build(mat.clone())
            .unwrap();
        let mut amg =
            Amg::new(hierarchy, SmootherType::SymmetricGaussSeidel, CycleParams::default())
                .unwrap();
        let b = random_vec(256);
        let (_, info) = pcg(&mat, &b, &Vector::zeros(256), 200, 1e-8, &mut amg).unwrap();
        assert!(info.converged);
    }

    #[test]
    fn mismatched_vectors_are_rejected() {
        let (_, mut amg) = laplace_amg(CycleParams::default());
        let mut v = Vector::zeros(10);
        assert!(amg.apply(&mut v, &Vector::zeros(10)).is_err());
    }

    #[test]
    fn parse_cycle_params() {
        assert_eq!(CycleType::from_str("w").unwrap(), CycleType::W);
        let params: CycleParams =
            serde_json::from_str(r#"{ "cycle": "W", "pre_smoothing": 2 }"#).unwrap();
        assert_eq!(params.cycle.gamma(), 2);
        assert_eq!(params.pre_smoothing, 2);
        assert_eq!(params.post_smoothing, 1);
    }
}
