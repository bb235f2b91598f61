use core::fmt;

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use serde::Serialize;

use crate::aggregation::{aggregate, AggregatesMap};
use crate::criterion::CoarseningCriterion;
use crate::dependency::{classify, DependencyCriterion, SymmetricDependency};
use crate::error::{AmgError, Result};
use crate::graph::{MatrixGraph, SubGraph};
use crate::interpolation::{galerkin_product, Transfer};
use crate::ownership::{Ownership, Sequential};
use crate::preconditioner::SmootherFactory;
use crate::{CsrMatrix, Vector};

/// One `T` per level, finest at index 0.
///
/// Never empty: it is created from the finest level object and only grows
/// towards coarser levels.
#[derive(Clone, Debug)]
pub struct Hierarchy<T> {
    levels: Vec<T>,
}

impl<T> Hierarchy<T> {
    pub fn new(finest: T) -> Self {
        Self {
            levels: vec![finest],
        }
    }

    /// Appends a new coarsest level.
    pub fn push(&mut self, coarser: T) {
        self.levels.push(coarser);
    }

    /// Number of levels in the hierarchy.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    pub fn finest(&self) -> &T {
        &self.levels[0]
    }

    pub fn finest_mut(&mut self) -> &mut T {
        &mut self.levels[0]
    }

    pub fn coarsest_mut(&mut self) -> &mut T {
        let last = self.levels.len() - 1;
        &mut self.levels[last]
    }

    pub fn get(&self, level: usize) -> Option<&T> {
        self.levels.get(level)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.levels.iter()
    }

    /// Mutable access to `level` and the next coarser level at once.
    pub fn pair_mut(&mut self, level: usize) -> (&mut T, &mut T) {
        let (fine, coarse) = self.levels.split_at_mut(level + 1);
        (&mut fine[level], &mut coarse[0])
    }

    /// Builds a parallel hierarchy with one object per level.
    pub fn map<U, F>(&self, mut f: F) -> Hierarchy<U>
    where
        F: FnMut(usize, &T) -> U,
    {
        Hierarchy {
            levels: self.levels.iter().enumerate().map(|(i, t)| f(i, t)).collect(),
        }
    }

    pub fn try_map<U, F>(&self, mut f: F) -> Result<Hierarchy<U>>
    where
        F: FnMut(usize, &T) -> Result<U>,
    {
        let levels = self
            .levels
            .iter()
            .enumerate()
            .map(|(i, t)| f(i, t))
            .collect::<Result<Vec<U>>>()?;
        Ok(Hierarchy { levels })
    }
}

impl<T> Index<usize> for Hierarchy<T> {
    type Output = T;

    fn index(&self, level: usize) -> &T {
        &self.levels[level]
    }
}

impl<T> IndexMut<usize> for Hierarchy<T> {
    fn index_mut(&mut self, level: usize) -> &mut T {
        &mut self.levels[level]
    }
}

/// Matrix of one level together with everything derived from it. Every
/// level but the coarsest also carries its aggregates and the transfer to
/// the next level.
pub struct Level {
    mat: Arc<CsrMatrix>,
    graph: MatrixGraph,
    excluded: Vec<bool>,
    aggregates: Option<AggregatesMap>,
    transfer: Option<Transfer>,
}

impl Level {
    fn new(mat: Arc<CsrMatrix>, graph: MatrixGraph, excluded: Vec<bool>) -> Self {
        Self {
            mat,
            graph,
            excluded,
            aggregates: None,
            transfer: None,
        }
    }

    pub fn mat(&self) -> &Arc<CsrMatrix> {
        &self.mat
    }

    pub fn graph(&self) -> &MatrixGraph {
        &self.graph
    }

    /// Vertices left out of aggregation on this level.
    pub fn excluded(&self) -> &[bool] {
        &self.excluded
    }

    pub fn aggregates(&self) -> Option<&AggregatesMap> {
        self.aggregates.as_ref()
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }
}

/// Why the hierarchy did not grow any further.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HierarchyStop {
    MaxLevels,
    /// The coarsest level is small enough for the coarse solver.
    CoarsenTarget,
    /// Aggregating `level` would only have gone from `fine` to `coarse`
    /// unknowns, so that level became the coarsest.
    CoarseningStalled {
        level: usize,
        fine: usize,
        coarse: usize,
    },
}

/// Configures and runs the construction of a [`MatrixHierarchy`].
pub struct HierarchyBuilder<D = SymmetricDependency> {
    criterion: CoarseningCriterion,
    dependency: D,
    ownership: Arc<dyn Ownership + Send + Sync>,
}

impl HierarchyBuilder<SymmetricDependency> {
    pub fn new(criterion: CoarseningCriterion) -> Self {
        Self {
            criterion,
            dependency: SymmetricDependency,
            ownership: Arc::new(Sequential),
        }
    }
}

impl<D: DependencyCriterion> HierarchyBuilder<D> {
    /// Replaces the strength of connection measure.
    pub fn with_dependency<E: DependencyCriterion>(self, dependency: E) -> HierarchyBuilder<E> {
        HierarchyBuilder {
            criterion: self.criterion,
            dependency,
            ownership: self.ownership,
        }
    }

    pub fn with_ownership<O>(mut self, ownership: O) -> Self
    where
        O: Ownership + Send + Sync + 'static,
    {
        self.ownership = Arc::new(ownership);
        self
    }

    pub fn with_criterion(mut self, criterion: CoarseningCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn build(&self, mat: Arc<CsrMatrix>) -> Result<MatrixHierarchy> {
        self.criterion.validate()?;
        let graph = MatrixGraph::new(&mat)?;
        let excluded: Vec<bool> = (0..mat.rows())
            .map(|v| !self.ownership.is_owned(v))
            .collect();
        trace!(
            "building hierarchy for {} unknowns and {} nnz, {} excluded",
            mat.rows(),
            mat.nnz(),
            excluded.iter().filter(|e| **e).count()
        );

        let mut levels = Hierarchy::new(Level::new(mat, graph, excluded));
        let stop = loop {
            if let Some(stop) = self.add_level(&mut levels)? {
                break stop;
            }
        };

        let hierarchy = MatrixHierarchy {
            levels,
            ownership: self.ownership.clone(),
            criterion: self.criterion.clone(),
            stop,
        };
        info!("{:?}", hierarchy);
        Ok(hierarchy)
    }

    /// Coarsens the current coarsest level, or tells why it should not be.
    fn add_level(&self, levels: &mut Hierarchy<Level>) -> Result<Option<HierarchyStop>> {
        let level = levels.levels() - 1;
        if levels.levels() >= self.criterion.max_levels {
            return Ok(Some(HierarchyStop::MaxLevels));
        }

        let fine = levels.coarsest_mut();
        let fine_size = fine.mat.rows();
        if fine_size <= self.criterion.coarsen_target {
            return Ok(Some(HierarchyStop::CoarsenTarget));
        }

        let dependencies = classify(&fine.graph, &self.criterion, &self.dependency);
        let subgraph = SubGraph::new(&fine.graph, &fine.excluded)?;
        let aggregates = aggregate(&subgraph, &dependencies, &self.criterion)?;
        let transfer = Transfer::new(&aggregates, &fine.excluded)?;

        let coarse_size = transfer.coarse_len();
        if self.criterion.is_stalled(fine_size, coarse_size) {
            warn!(
                "coarsening stalled on level {}: {} -> {} unknowns, stopping",
                level, fine_size, coarse_size
            );
            return Ok(Some(HierarchyStop::CoarseningStalled {
                level,
                fine: fine_size,
                coarse: coarse_size,
            }));
        }

        let coarse_mat = galerkin_product(&fine.mat, &transfer)?;
        let coarse_graph = MatrixGraph::new(&coarse_mat)?;
        let coarse_excluded = transfer.coarse_excluded().to_vec();
        trace!(
            "added level: {}. num vertices coarse: {} nnz: {} aggregates: {} isolated: {}",
            level + 1,
            coarse_size,
            coarse_mat.nnz(),
            aggregates.num_aggregates(),
            aggregates.num_isolated()
        );

        fine.aggregates = Some(aggregates);
        fine.transfer = Some(transfer);
        levels.push(Level::new(
            Arc::new(coarse_mat),
            coarse_graph,
            coarse_excluded,
        ));
        Ok(None)
    }
}

/// The chain of Galerkin operators from the fine matrix down to the
/// coarsest level.
pub struct MatrixHierarchy {
    levels: Hierarchy<Level>,
    ownership: Arc<dyn Ownership + Send + Sync>,
    criterion: CoarseningCriterion,
    stop: HierarchyStop,
}

impl fmt::Debug for MatrixHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes = self.get_dims();
        let nnzs = self.get_nnzs();
        let total_nnz = nnzs.iter().sum::<usize>();
        let coarsening_factors: Vec<f32> = sizes
            .iter()
            .zip(sizes.iter().skip(1))
            .map(|(a, b)| (*a as f32) / (*b as f32))
            .collect();

        f.debug_struct("MatrixHierarchy")
            .field("levels", &self.levels())
            .field("sizes", &sizes)
            .field("coarsening_factors", &coarsening_factors)
            .field("nnz", &nnzs)
            .field("total_nnz_and_complexity", &(total_nnz, self.op_complexity()))
            .field("stop", &self.stop)
            .finish()
    }
}

/// Serializable statistics of a hierarchy.
#[derive(Clone, Debug, Serialize)]
pub struct HierarchySummary {
    pub sizes: Vec<usize>,
    pub nnz: Vec<usize>,
    pub op_complexity: f64,
    pub stop: HierarchyStop,
    pub criterion: CoarseningCriterion,
}

impl MatrixHierarchy {
    /// Builds the hierarchy with the default strength measure on a single
    /// process.
    pub fn build(mat: Arc<CsrMatrix>, criterion: &CoarseningCriterion) -> Result<Self> {
        HierarchyBuilder::new(criterion.clone()).build(mat)
    }

    /// Number of levels in the hierarchy.
    pub fn levels(&self) -> usize {
        self.levels.levels()
    }

    pub fn level(&self, level: usize) -> &Level {
        &self.levels[level]
    }

    pub fn get_mat(&self, level: usize) -> Arc<CsrMatrix> {
        self.levels[level].mat.clone()
    }

    /// Aggregates of `level`, `None` on the coarsest level.
    pub fn aggregates(&self, level: usize) -> Option<&AggregatesMap> {
        self.levels.get(level).and_then(|l| l.aggregates())
    }

    /// Transfer between `level` and `level + 1`, `None` on the coarsest level.
    pub fn transfer(&self, level: usize) -> Option<&Transfer> {
        self.levels.get(level).and_then(|l| l.transfer())
    }

    pub fn criterion(&self) -> &CoarseningCriterion {
        &self.criterion
    }

    pub fn stop_reason(&self) -> HierarchyStop {
        self.stop
    }

    /// Hands a restricted defect of `level` to the ownership provider.
    pub fn exchange_overlap(&self, level: usize, values: &mut Vector) {
        self.ownership.exchange_overlap(level, values);
    }

    /// Work vectors for every level: `fine` itself on the finest level and
    /// zeros of the right size below it.
    pub fn coarsen_vector(&self, fine: &Vector) -> Result<Hierarchy<Vector>> {
        let n = self.levels.finest().mat.rows();
        if fine.len() != n {
            return Err(AmgError::DimensionMismatch {
                expected: n,
                actual: fine.len(),
            });
        }
        Ok(self.levels.map(|i, level| {
            if i == 0 {
                fine.clone()
            } else {
                Vector::zeros(level.mat.rows())
            }
        }))
    }

    /// One smoother per level, bound to that level's matrix.
    pub fn smoothers<F: SmootherFactory>(&self, factory: &F) -> Result<Hierarchy<F::Smoother>> {
        trace!("building smoothers for {} levels", self.levels());
        self.levels
            .try_map(|_, level| factory.make_smoother(level.mat.clone()))
    }

    /// Replaces the fine matrix by one with the same sparsity pattern and
    /// recomputes every coarse matrix with the existing aggregates.
    /// Smoothers built from the old matrices have to be rebuilt.
    pub fn recalculate_galerkin(&mut self, fine_mat: Arc<CsrMatrix>) -> Result<()> {
        let old = &self.levels.finest().mat;
        if fine_mat.rows() != old.rows() || fine_mat.cols() != old.cols() {
            return Err(AmgError::DimensionMismatch {
                expected: old.rows(),
                actual: fine_mat.rows(),
            });
        }
        if !fine_mat.is_csr()
            || fine_mat.indptr().raw_storage() != old.indptr().raw_storage()
            || fine_mat.indices() != old.indices()
        {
            return Err(AmgError::InvalidMatrix(
                "sparsity pattern differs from the one the hierarchy was built for".into(),
            ));
        }

        let graph = MatrixGraph::new(&fine_mat)?;
        let finest = self.levels.finest_mut();
        finest.mat = fine_mat;
        finest.graph = graph;

        for level in 0..self.levels() - 1 {
            let (fine, coarse) = self.levels.pair_mut(level);
            let transfer = fine.transfer.as_ref().ok_or_else(|| {
                AmgError::InvalidMatrix(format!("level {} has no transfer", level))
            })?;
            let coarse_mat = galerkin_product(&fine.mat, transfer)?;
            coarse.graph = MatrixGraph::new(&coarse_mat)?;
            coarse.mat = Arc::new(coarse_mat);
        }
        trace!("recalculated {} galerkin products", self.levels() - 1);
        Ok(())
    }

    /// Total nnz / finest level nnz
    pub fn op_complexity(&self) -> f64 {
        let nnzs = self.get_nnzs();
        let total = nnzs.iter().sum::<usize>() as f64;
        total / (nnzs[0] as f64)
    }

    pub fn get_nnzs(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.mat.nnz()).collect()
    }

    pub fn get_dims(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.mat.rows()).collect()
    }

    pub fn summary(&self) -> HierarchySummary {
        HierarchySummary {
            sizes: self.get_dims(),
            nnz: self.get_nnzs(),
            op_complexity: self.op_complexity(),
            stop: self.stop,
            criterion: self.criterion.clone(),
        }
    }
}

#[cfg(test)]
extern crate test_generator;
