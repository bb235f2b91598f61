//! Piecewise-constant transfer between two levels and the Galerkin product.
//!
//! The prolongation `P` is never assembled: every fine vertex maps to
//! exactly one coarse vertex, so `P x`, `Pᵗ r` and `Pᵗ A P` are all plain
//! index scatters over that map.

use crate::aggregation::{AggregateId, AggregatesMap};
use crate::error::{AmgError, Result};
use crate::{CooMatrix, CsrMatrix, Vector};

/// Fine to coarse vertex map of one level.
///
/// Coarse vertices `0..num_aggregates` are the aggregates. Every isolated
/// or excluded fine vertex gets a dedicated coarse vertex after them, in
/// fine vertex order, so no unknown is dropped on the coarse level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    fine_to_coarse: Vec<usize>,
    coarse_sizes: Vec<usize>,
    coarse_excluded: Vec<bool>,
    num_aggregates: usize,
}

impl Transfer {
    pub fn new(aggregates: &AggregatesMap, excluded: &[bool]) -> Result<Self> {
        if excluded.len() != aggregates.len() {
            return Err(AmgError::DimensionMismatch {
                expected: aggregates.len(),
                actual: excluded.len(),
            });
        }

        let num_aggregates = aggregates.num_aggregates();
        let mut coarse_sizes: Vec<usize> =
            aggregates.aggregates().iter().map(|a| a.len()).collect();
        let mut coarse_excluded = vec![false; num_aggregates];
        let mut fine_to_coarse = Vec::with_capacity(aggregates.len());

        for (v, id) in aggregates.node_to_agg().iter().enumerate() {
            let coarse = match id {
                AggregateId::Aggregate(id) => *id,
                AggregateId::Isolated | AggregateId::Unaggregated => {
                    coarse_sizes.push(1);
                    coarse_excluded.push(excluded[v]);
                    coarse_sizes.len() - 1
                }
            };
            fine_to_coarse.push(coarse);
        }

        Ok(Self {
            fine_to_coarse,
            coarse_sizes,
            coarse_excluded,
            num_aggregates,
        })
    }

    pub fn fine_len(&self) -> usize {
        self.fine_to_coarse.len()
    }

    pub fn coarse_len(&self) -> usize {
        self.coarse_sizes.len()
    }

    pub fn num_aggregates(&self) -> usize {
        self.num_aggregates
    }

    pub fn coarse_index(&self, fine: usize) -> usize {
        self.fine_to_coarse[fine]
    }

    /// Number of fine vertices collapsed into each coarse vertex.
    pub fn coarse_sizes(&self) -> &[usize] {
        &self.coarse_sizes
    }

    /// Which coarse vertices stand for excluded fine vertices.
    pub fn coarse_excluded(&self) -> &[bool] {
        &self.coarse_excluded
    }

    /// `coarse = Pᵗ fine`: sums the fine values of every coarse vertex.
    pub fn restrict(&self, fine: &Vector, coarse: &mut Vector) {
        assert_eq!(fine.len(), self.fine_len());
        assert_eq!(coarse.len(), self.coarse_len());
        coarse.fill(0.0);
        for (i, &c) in self.fine_to_coarse.iter().enumerate() {
            coarse[c] += fine[i];
        }
    }

    /// `fine += P coarse`: every fine vertex receives its coarse value.
    pub fn prolong_add(&self, coarse: &Vector, fine: &mut Vector) {
        assert_eq!(fine.len(), self.fine_len());
        assert_eq!(coarse.len(), self.coarse_len());
        for (i, &c) in self.fine_to_coarse.iter().enumerate() {
            fine[i] += coarse[c];
        }
    }

    /// `P coarse` as a new vector.
    pub fn prolong(&self, coarse: &Vector) -> Vector {
        let mut fine = Vector::zeros(self.fine_len());
        self.prolong_add(coarse, &mut fine);
        fine
    }
}

/// Galerkin coarse operator `Pᵗ A P`: every fine entry `a_ij` is added to
/// the coarse entry `(c(i), c(j))`.
pub fn galerkin_product(fine_mat: &CsrMatrix, transfer: &Transfer) -> Result<CsrMatrix> {
    if fine_mat.rows() != transfer.fine_len() || fine_mat.cols() != transfer.fine_len() {
        return Err(AmgError::DimensionMismatch {
            expected: transfer.fine_len(),
            actual: fine_mat.rows(),
        });
    }

    let n_coarse = transfer.coarse_len();
    let mut coarse = CooMatrix::with_capacity((n_coarse, n_coarse), fine_mat.nnz());
    for (i, row) in fine_mat.outer_iterator().enumerate() {
        let ci = transfer.coarse_index(i);
        for (j, &val) in row.iter() {
            coarse.add_triplet(ci, transfer.coarse_index(j), val);
        }
    }
    Ok(coarse.to_csr())
}
