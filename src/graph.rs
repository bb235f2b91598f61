//! Read-only adjacency views over the matrix of a level.
//!
//! Vertices are the unknowns of the level and edges are the nonzero
//! off-diagonal entries. The graph copies the sparsity structure into its
//! own arrays so it can be handed around by index without borrowing the
//! matrix it was built from.

use std::ops::Range;

use crate::error::{AmgError, Result};
use crate::CsrMatrix;

/// Bitset of per-edge strength of connection flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EdgeProperties(u8);

impl EdgeProperties {
    const DEPENDS: u8 = 0b01;
    const INFLUENCES: u8 = 0b10;

    /// Source strongly depends on target.
    pub fn depends(&self) -> bool {
        self.0 & Self::DEPENDS != 0
    }

    /// Target strongly depends on source.
    pub fn influences(&self) -> bool {
        self.0 & Self::INFLUENCES != 0
    }

    pub fn set_depends(&mut self) {
        self.0 |= Self::DEPENDS;
    }

    pub fn set_influences(&mut self) {
        self.0 |= Self::INFLUENCES;
    }

    pub fn is_strong(&self) -> bool {
        self.0 != 0
    }

    pub fn is_two_way(&self) -> bool {
        self.0 == Self::DEPENDS | Self::INFLUENCES
    }

    pub fn is_one_way(&self) -> bool {
        self.is_strong() && !self.is_two_way()
    }
}

/// Bitset of per-vertex flags used by the classifier and the aggregator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexProperties(u8);

impl VertexProperties {
    const ISOLATED: u8 = 0b0001;
    const FRONT: u8 = 0b0010;
    const VISITED: u8 = 0b0100;
    const EXCLUDED: u8 = 0b1000;

    pub fn isolated(&self) -> bool {
        self.0 & Self::ISOLATED != 0
    }

    pub fn front(&self) -> bool {
        self.0 & Self::FRONT != 0
    }

    pub fn visited(&self) -> bool {
        self.0 & Self::VISITED != 0
    }

    pub fn excluded(&self) -> bool {
        self.0 & Self::EXCLUDED != 0
    }

    pub fn set_isolated(&mut self) {
        self.0 |= Self::ISOLATED;
    }

    pub fn set_front(&mut self) {
        self.0 |= Self::FRONT;
    }

    pub fn reset_front(&mut self) {
        self.0 &= !Self::FRONT;
    }

    pub fn set_visited(&mut self) {
        self.0 |= Self::VISITED;
    }

    pub fn set_excluded(&mut self) {
        self.0 |= Self::EXCLUDED;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    /// Position of the edge in the graph's edge arrays.
    pub index: usize,
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

#[derive(Clone, Debug)]
pub struct MatrixGraph {
    offsets: Vec<usize>,
    targets: Vec<usize>,
    weights: Vec<f64>,
    diagonal: Vec<f64>,
}

impl MatrixGraph {
    /// Builds the graph of a square CSR matrix. Every row needs a nonzero
    /// diagonal entry because the strength measures scale by it.
    pub fn new(mat: &CsrMatrix) -> Result<Self> {
        if !mat.is_csr() {
            return Err(AmgError::InvalidMatrix(
                "matrix must be stored by rows".into(),
            ));
        }
        if mat.rows() != mat.cols() {
            return Err(AmgError::InvalidMatrix(format!(
                "matrix must be square, got {}x{}",
                mat.rows(),
                mat.cols()
            )));
        }

        let n = mat.rows();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut targets = Vec::with_capacity(mat.nnz().saturating_sub(n));
        let mut weights = Vec::with_capacity(mat.nnz().saturating_sub(n));
        let mut diagonal = vec![0.0; n];
        offsets.push(0);

        for (i, row) in mat.outer_iterator().enumerate() {
            for (j, &val) in row.iter() {
                if i == j {
                    diagonal[i] += val;
                } else if val != 0.0 {
                    targets.push(j);
                    weights.push(val);
                }
            }
            if diagonal[i] == 0.0 {
                return Err(AmgError::InvalidMatrix(format!(
                    "zero or missing diagonal entry in row {}",
                    i
                )));
            }
            offsets.push(targets.len());
        }

        Ok(Self {
            offsets,
            targets,
            weights,
            diagonal,
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.diagonal.len()
    }

    pub fn num_edges(&self) -> usize {
        self.targets.len()
    }

    pub fn diagonal(&self, vertex: usize) -> f64 {
        self.diagonal[vertex]
    }

    /// Indices of the out-edges of `vertex`, ascending by target.
    pub fn edge_range(&self, vertex: usize) -> Range<usize> {
        self.offsets[vertex]..self.offsets[vertex + 1]
    }

    pub fn degree(&self, vertex: usize) -> usize {
        self.offsets[vertex + 1] - self.offsets[vertex]
    }

    pub fn target(&self, edge: usize) -> usize {
        self.targets[edge]
    }

    pub fn weight(&self, edge: usize) -> f64 {
        self.weights[edge]
    }

    pub fn edges(&self, vertex: usize) -> impl Iterator<Item = Edge> + '_ {
        self.edge_range(vertex).map(move |index| Edge {
            index,
            source: vertex,
            target: self.targets[index],
            weight: self.weights[index],
        })
    }

    /// Index of the edge `source -> target` if the matrix stores it.
    pub fn find_edge(&self, source: usize, target: usize) -> Option<usize> {
        let range = self.edge_range(source);
        let start = range.start;
        self.targets[range]
            .binary_search(&target)
            .ok()
            .map(|pos| start + pos)
    }
}

/// Restriction of a [`MatrixGraph`] to the vertices that are not excluded.
///
/// Edges leading to excluded vertices are hidden, so the aggregator never
/// sees overlap or boundary vertices.
#[derive(Clone, Copy, Debug)]
pub struct SubGraph<'a> {
    graph: &'a MatrixGraph,
    excluded: &'a [bool],
}

impl<'a> SubGraph<'a> {
    pub fn new(graph: &'a MatrixGraph, excluded: &'a [bool]) -> Result<Self> {
        if excluded.len() != graph.num_vertices() {
            return Err(AmgError::DimensionMismatch {
                expected: graph.num_vertices(),
                actual: excluded.len(),
            });
        }
        Ok(Self { graph, excluded })
    }

    pub fn graph(&self) -> &'a MatrixGraph {
        self.graph
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn contains(&self, vertex: usize) -> bool {
        !self.excluded[vertex]
    }

    pub fn vertices(&self) -> impl Iterator<Item = usize> + 'a {
        let excluded = self.excluded;
        (0..excluded.len()).filter(move |v| !excluded[*v])
    }

    pub fn edges(&self, vertex: usize) -> impl Iterator<Item = Edge> + 'a {
        let excluded = self.excluded;
        self.graph
            .edges(vertex)
            .filter(move |edge| !excluded[edge.target])
    }
}

#[cfg(test)]
mod tests {
    use super::{EdgeProperties, MatrixGraph, SubGraph, VertexProperties};
    use crate::error::AmgError;
    use crate::utils::laplace_1d;
    use crate::CooMatrix;

    #[test]
    fn laplace_graph_structure() {
        let mat = laplace_1d(5);
        let graph = MatrixGraph::new(&mat).unwrap();
        assert_eq!(graph.num_vertices(), 5);
        assert_eq!(graph.num_edges(), 8);
        assert_eq!(graph.diagonal(2), 2.0);

        let targets: Vec<usize> = graph.edges(2).map(|e| e.target).collect();
        assert_eq!(targets, vec![1, 3]);
        assert!(graph.edges(0).all(|e| e.weight == -1.0));
        assert_eq!(graph.degree(4), 1);

        let edge = graph.find_edge(3, 2).unwrap();
        assert_eq!(graph.target(edge), 2);
        assert!(graph.find_edge(0, 4).is_none());
    }

    #[test]
    fn missing_diagonal_is_rejected() {
        let mut coo = CooMatrix::new((3, 3));
        coo.add_triplet(0, 0, 1.0);
        coo.add_triplet(0, 1, -1.0);
        coo.add_triplet(1, 0, -1.0);
        coo.add_triplet(2, 2, 1.0);
        let mat = coo.to_csr();
        assert!(matches!(
            MatrixGraph::new(&mat),
            Err(AmgError::InvalidMatrix(_))
        ));
    }

    #[test]
    fn non_square_is_rejected() {
        let mut coo = CooMatrix::new((2, 3));
        coo.add_triplet(0, 0, 1.0);
        coo.add_triplet(1, 1, 1.0);
        assert!(MatrixGraph::new(&coo.to_csr()).is_err());
    }

    #[test]
    fn subgraph_hides_excluded_vertices() {
        let graph = MatrixGraph::new(&laplace_1d(4)).unwrap();
        let excluded = vec![false, false, true, false];
        let sub = SubGraph::new(&graph, &excluded).unwrap();
        assert_eq!(sub.vertices().collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(sub.edges(1).map(|e| e.target).collect::<Vec<_>>(), vec![0]);
        assert_eq!(sub.edges(3).count(), 0);
        assert!(!sub.contains(2));

        let short = vec![false; 3];
        assert!(SubGraph::new(&graph, &short).is_err());
    }

    #[test]
    fn property_bits() {
        let mut edge = EdgeProperties::default();
        assert!(!edge.is_strong());
        edge.set_depends();
        assert!(edge.is_one_way());
        edge.set_influences();
        assert!(edge.is_two_way());

        let mut vertex = VertexProperties::default();
        vertex.set_front();
        vertex.set_visited();
        assert!(vertex.front() && vertex.visited());
        vertex.reset_front();
        assert!(!vertex.front() && vertex.visited() && !vertex.isolated());
    }
}
