//! Strength of connection.
//!
//! A [`DependencyCriterion`] decides, row by row, which off-diagonal
//! couplings are strong. [`classify`] turns those decisions into
//! [`EdgeProperties`] and [`VertexProperties`] for the whole graph. The
//! result only depends on the matrix and the criterion, so rows are
//! examined in parallel.

use rayon::prelude::*;

use crate::criterion::CoarseningCriterion;
use crate::graph::{EdgeProperties, MatrixGraph, VertexProperties};

/// Strength measure plugged into the classifier.
pub trait DependencyCriterion: Sync {
    /// Returns one flag per out-edge of `vertex` (in edge order) telling
    /// whether `vertex` strongly depends on the target of that edge.
    fn dependencies(
        &self,
        graph: &MatrixGraph,
        vertex: usize,
        criterion: &CoarseningCriterion,
    ) -> Vec<bool>;
}

/// Row based symmetric strength of connection:
/// `|a_vw| >= alpha * max_k |a_vk|`, where rows whose largest coupling is
/// below `beta * |a_vv|` have no strong connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymmetricDependency;

impl DependencyCriterion for SymmetricDependency {
    fn dependencies(
        &self,
        graph: &MatrixGraph,
        vertex: usize,
        criterion: &CoarseningCriterion,
    ) -> Vec<bool> {
        let max_off_diag = graph
            .edges(vertex)
            .map(|edge| edge.weight.abs())
            .fold(0.0_f64, f64::max);

        if max_off_diag == 0.0 || max_off_diag < criterion.beta * graph.diagonal(vertex).abs() {
            return vec![false; graph.degree(vertex)];
        }

        let threshold = criterion.alpha * max_off_diag;
        graph
            .edges(vertex)
            .map(|edge| edge.weight.abs() >= threshold)
            .collect()
    }
}

/// Edge and vertex properties of one level's graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependencies {
    edges: Vec<EdgeProperties>,
    vertices: Vec<VertexProperties>,
}

impl Dependencies {
    pub fn edge(&self, edge: usize) -> EdgeProperties {
        self.edges[edge]
    }

    pub fn vertex(&self, vertex: usize) -> VertexProperties {
        self.vertices[vertex]
    }

    pub fn edges(&self) -> &[EdgeProperties] {
        &self.edges
    }

    pub fn vertices(&self) -> &[VertexProperties] {
        &self.vertices
    }

    pub fn num_isolated(&self) -> usize {
        self.vertices.iter().filter(|v| v.isolated()).count()
    }
}

/// Classifies every edge and vertex of `graph`.
///
/// An edge `(v, w)` influences when the reverse edge `(w, v)` depends; a
/// vertex is isolated when none of its edges depends.
pub fn classify<D: DependencyCriterion>(
    graph: &MatrixGraph,
    criterion: &CoarseningCriterion,
    measure: &D,
) -> Dependencies {
    let n = graph.num_vertices();

    let depends: Vec<bool> = (0..n)
        .into_par_iter()
        .flat_map_iter(|v| measure.dependencies(graph, v, criterion))
        .collect();
    assert_eq!(depends.len(), graph.num_edges());
    let depends = &depends;

    let edges: Vec<EdgeProperties> = (0..n)
        .into_par_iter()
        .flat_map_iter(|v| {
            graph.edges(v).map(move |edge| {
                let mut props = EdgeProperties::default();
                if depends[edge.index] {
                    props.set_depends();
                }
                if let Some(reverse) = graph.find_edge(edge.target, v) {
                    if depends[reverse] {
                        props.set_influences();
                    }
                }
                props
            })
        })
        .collect();

    let vertices: Vec<VertexProperties> = (0..n)
        .into_par_iter()
        .map(|v| {
            let mut props = VertexProperties::default();
            if !graph.edge_range(v).any(|e| depends[e]) {
                props.set_isolated();
            }
            props
        })
        .collect();

    let dependencies = Dependencies { edges, vertices };
    trace!(
        "classified {} vertices and {} edges, {} isolated",
        n,
        graph.num_edges(),
        dependencies.num_isolated()
    );
    dependencies
}

#[cfg(test)]
mod tests {
    use super::{classify, SymmetricDependency};
    use crate::criterion::CoarseningCriterion;
    use crate::graph::MatrixGraph;
    use crate::utils::{laplace_1d, laplace_2d};
    use crate::CooMatrix;

    #[test]
    fn zero_alpha_makes_every_edge_strong() {
        let graph = MatrixGraph::new(&laplace_2d(4, 4, 0.01)).unwrap();
        let deps = classify(&graph, &CoarseningCriterion::default(), &SymmetricDependency);
        assert!(deps.edges().iter().all(|e| e.is_two_way()));
        assert_eq!(deps.num_isolated(), 0);
    }

    #[test]
    fn anisotropy_keeps_only_strong_direction() {
        let nx = 4;
        let graph = MatrixGraph::new(&laplace_2d(nx, 4, 0.01)).unwrap();
        let criterion = CoarseningCriterion::new().with_alpha(1.0 / 3.0);
        let deps = classify(&graph, &criterion, &SymmetricDependency);

        for v in 0..graph.num_vertices() {
            for edge in graph.edges(v) {
                let props = deps.edge(edge.index);
                let same_row = edge.target / nx == v / nx;
                assert_eq!(props.depends(), same_row);
                assert_eq!(props.influences(), same_row);
            }
        }
    }

    #[test]
    fn decoupled_rows_are_isolated() {
        // Row 0 is a Dirichlet row, row 3 couples only weakly.
        let mut coo = CooMatrix::new((4, 4));
        coo.add_triplet(0, 0, 1.0);
        coo.add_triplet(1, 1, 2.0);
        coo.add_triplet(1, 2, -1.0);
        coo.add_triplet(2, 1, -1.0);
        coo.add_triplet(2, 2, 2.0);
        coo.add_triplet(2, 3, -1.0e-9);
        coo.add_triplet(3, 2, -1.0e-9);
        coo.add_triplet(3, 3, 1.0);
        let graph = MatrixGraph::new(&coo.to_csr()).unwrap();
        let deps = classify(&graph, &CoarseningCriterion::default(), &SymmetricDependency);

        assert!(deps.vertex(0).isolated());
        assert!(!deps.vertex(1).isolated());
        assert!(!deps.vertex(2).isolated());
        assert!(deps.vertex(3).isolated());

        // 2 -> 3 depends (alpha = 0) but 3 -> 2 does not, so the edge is one-way.
        let edge = graph.find_edge(2, 3).unwrap();
        assert!(deps.edge(edge).depends());
        assert!(!deps.edge(edge).influences());
        assert!(deps.edge(edge).is_one_way());
    }

    #[test]
    fn classification_is_idempotent() {
        let graph = MatrixGraph::new(&laplace_2d(8, 8, 0.1)).unwrap();
        let criterion = CoarseningCriterion::new().with_alpha(0.2);
        let first = classify(&graph, &criterion, &SymmetricDependency);
        let second = classify(&graph, &criterion, &SymmetricDependency);
        assert_eq!(first, second);

        let graph = MatrixGraph::new(&laplace_1d(10)).unwrap();
        let first = classify(&graph, &criterion, &SymmetricDependency);
        assert_eq!(first, classify(&graph, &criterion, &SymmetricDependency));
    }
}
