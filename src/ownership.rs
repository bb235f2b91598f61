//! Vertex ownership of the finest level.
//!
//! In a distributed run every process aggregates only the vertices it owns;
//! overlap vertices are classified but never used as seeds, and defects on
//! them have to be exchanged between processes after restriction. The
//! actual communication is provided by the caller. The implementations here
//! cover a single process.

use indexmap::IndexSet;

use crate::Vector;

pub trait Ownership {
    /// Whether `vertex` of the finest level belongs to this process.
    fn is_owned(&self, vertex: usize) -> bool;

    /// Reduces and exchanges the values of shared vertices of `level`.
    /// Called on every restricted defect before it is used on `level`.
    fn exchange_overlap(&self, _level: usize, _values: &mut Vector) {}
}

/// Single process, everything owned, nothing to exchange.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

impl Ownership for Sequential {
    fn is_owned(&self, _vertex: usize) -> bool {
        true
    }
}

/// Marks a fixed set of finest level vertices as overlap. Those vertices
/// are left out of aggregation and carried to the coarse levels as vertices
/// of their own.
#[derive(Clone, Debug, Default)]
pub struct OverlapSet {
    overlap: IndexSet<usize>,
}

impl OverlapSet {
    pub fn new<I: IntoIterator<Item = usize>>(overlap: I) -> Self {
        Self {
            overlap: overlap.into_iter().collect(),
        }
    }
}

impl Ownership for OverlapSet {
    fn is_owned(&self, vertex: usize) -> bool {
        !self.overlap.contains(&vertex)
    }
}
