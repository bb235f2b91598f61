//! Greedy aggregation of a level's graph.
//!
//! Seeds are visited in ascending vertex order. Each seed grows an
//! aggregate breadth first along strong edges until the size or distance
//! bound is hit. Aggregates that end up too small are released again and
//! their vertices become `front` vertices: later seeds may absorb them, and
//! whatever is left afterwards is merged into a neighbouring aggregate or,
//! failing that, becomes a singleton.

use std::collections::VecDeque;

use crate::criterion::CoarseningCriterion;
use crate::dependency::Dependencies;
use crate::error::{AmgError, Result};
use crate::graph::{SubGraph, VertexProperties};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateId {
    /// Not (yet) part of any aggregate. After aggregation only excluded
    /// vertices keep this state.
    Unaggregated,
    /// Decoupled vertex, never merged into an aggregate.
    Isolated,
    Aggregate(usize),
}

impl AggregateId {
    pub fn aggregate(&self) -> Option<usize> {
        match self {
            AggregateId::Aggregate(id) => Some(*id),
            _ => None,
        }
    }
}

/// Vertex to aggregate mapping of one level. Aggregate ids are dense in
/// `0..num_aggregates()` and numbered in the order aggregates were
/// finalised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatesMap {
    node_to_agg: Vec<AggregateId>,
    agg_to_node: Vec<Vec<usize>>,
}

impl AggregatesMap {
    /// Number of vertices covered by the map.
    pub fn len(&self) -> usize {
        self.node_to_agg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_to_agg.is_empty()
    }

    pub fn num_aggregates(&self) -> usize {
        self.agg_to_node.len()
    }

    pub fn get(&self, vertex: usize) -> AggregateId {
        self.node_to_agg[vertex]
    }

    /// Members of aggregate `id` in the order they joined.
    pub fn aggregate(&self, id: usize) -> &[usize] {
        &self.agg_to_node[id]
    }

    pub fn aggregates(&self) -> &[Vec<usize>] {
        &self.agg_to_node
    }

    pub fn node_to_agg(&self) -> &[AggregateId] {
        &self.node_to_agg
    }

    pub fn num_isolated(&self) -> usize {
        self.node_to_agg
            .iter()
            .filter(|id| **id == AggregateId::Isolated)
            .count()
    }

    pub fn num_unaggregated(&self) -> usize {
        self.node_to_agg
            .iter()
            .filter(|id| **id == AggregateId::Unaggregated)
            .count()
    }
}

/// Partitions the vertices of `graph` into aggregates.
///
/// Fails with [`AmgError::InvalidCriterion`] before touching the graph if the
/// size bounds are contradictory.
pub fn aggregate(
    graph: &SubGraph<'_>,
    dependencies: &Dependencies,
    criterion: &CoarseningCriterion,
) -> Result<AggregatesMap> {
    criterion.validate()?;
    if dependencies.vertices().len() != graph.num_vertices() {
        return Err(AmgError::DimensionMismatch {
            expected: graph.num_vertices(),
            actual: dependencies.vertices().len(),
        });
    }

    let mut aggregator = Aggregator::new(graph, dependencies, criterion);
    aggregator.first_pass();
    aggregator.second_pass();
    Ok(aggregator.finish())
}

struct Aggregator<'a> {
    graph: &'a SubGraph<'a>,
    dependencies: &'a Dependencies,
    criterion: &'a CoarseningCriterion,
    vertices: Vec<VertexProperties>,
    node_to_agg: Vec<AggregateId>,
    agg_to_node: Vec<Vec<usize>>,
    fronts: Vec<usize>,
}

impl<'a> Aggregator<'a> {
    fn new(
        graph: &'a SubGraph<'a>,
        dependencies: &'a Dependencies,
        criterion: &'a CoarseningCriterion,
    ) -> Self {
        let n = graph.num_vertices();
        let mut vertices = dependencies.vertices().to_vec();
        let mut node_to_agg = vec![AggregateId::Unaggregated; n];

        for v in 0..n {
            if !graph.contains(v) {
                vertices[v].set_excluded();
            } else if vertices[v].isolated() {
                node_to_agg[v] = AggregateId::Isolated;
            }
        }

        Self {
            graph,
            dependencies,
            criterion,
            vertices,
            node_to_agg,
            agg_to_node: Vec::new(),
            fronts: Vec::new(),
        }
    }

    fn first_pass(&mut self) {
        let seeds: Vec<usize> = self
            .graph
            .vertices()
            .filter(|v| !self.vertices[*v].isolated())
            .collect();

        for seed in seeds {
            if self.node_to_agg[seed] != AggregateId::Unaggregated {
                continue;
            }
            self.vertices[seed].set_visited();

            let members = self.grow(seed);
            if members.len() >= self.criterion.min_aggregate_size {
                self.finalize(members);
            } else {
                for v in members {
                    if !self.vertices[v].front() {
                        self.vertices[v].set_front();
                        self.fronts.push(v);
                    }
                }
            }
        }
    }

    /// Breadth first growth from `seed` over strong edges to unaggregated
    /// vertices. Visits neighbours in edge order.
    fn grow(&mut self, seed: usize) -> Vec<usize> {
        let max_size = self.criterion.max_aggregate_size;
        let max_distance = self.criterion.max_distance;
        let mut members = vec![seed];
        let mut queue = VecDeque::from(vec![(seed, 0_usize)]);

        'grow: while let Some((vertex, distance)) = queue.pop_front() {
            if distance >= max_distance {
                continue;
            }
            for edge in self.graph.edges(vertex) {
                if members.len() >= max_size {
                    break 'grow;
                }
                let target = edge.target;
                if !self.dependencies.edge(edge.index).is_strong()
                    || self.node_to_agg[target] != AggregateId::Unaggregated
                    || members.contains(&target)
                {
                    continue;
                }
                self.vertices[target].set_visited();
                members.push(target);
                queue.push_back((target, distance + 1));
            }
        }

        members
    }

    fn finalize(&mut self, members: Vec<usize>) {
        let id = self.agg_to_node.len();
        for &v in members.iter() {
            self.node_to_agg[v] = AggregateId::Aggregate(id);
            self.vertices[v].reset_front();
        }
        self.agg_to_node.push(members);
    }

    /// Merges leftover front vertices into adjacent aggregates that still
    /// have room, preferring the strongest coupling. Sweeps until nothing
    /// changes; the remaining fronts become singletons.
    fn second_pass(&mut self) {
        let mut pending: Vec<usize> = self
            .fronts
            .iter()
            .copied()
            .filter(|v| self.node_to_agg[*v] == AggregateId::Unaggregated)
            .collect();
        pending.sort_unstable();

        loop {
            let mut merged_any = false;
            pending.retain(|&v| match self.best_neighbour_aggregate(v) {
                Some(id) => {
                    self.node_to_agg[v] = AggregateId::Aggregate(id);
                    self.vertices[v].reset_front();
                    self.agg_to_node[id].push(v);
                    merged_any = true;
                    false
                }
                None => true,
            });
            if !merged_any || pending.is_empty() {
                break;
            }
        }

        if !pending.is_empty() {
            debug!(
                "{} front vertices could not be merged, keeping them as singletons",
                pending.len()
            );
        }
        for v in pending {
            self.finalize(vec![v]);
        }
    }

    fn best_neighbour_aggregate(&self, vertex: usize) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for edge in self.graph.edges(vertex) {
            if !self.dependencies.edge(edge.index).is_strong() {
                continue;
            }
            let id = match self.node_to_agg[edge.target] {
                AggregateId::Aggregate(id) => id,
                _ => continue,
            };
            if self.agg_to_node[id].len() >= self.criterion.max_aggregate_size {
                continue;
            }
            let strength = edge.weight.abs();
            if best.map_or(true, |(_, s)| strength > s) {
                best = Some((id, strength));
            }
        }
        best.map(|(id, _)| id)
    }

    fn finish(self) -> AggregatesMap {
        trace!(
            "aggregated {} vertices into {} aggregates ({} isolated, {} excluded)",
            self.node_to_agg.len(),
            self.agg_to_node.len(),
            self.vertices.iter().filter(|v| v.isolated() && !v.excluded()).count(),
            self.vertices.iter().filter(|v| v.excluded()).count(),
        );
        AggregatesMap {
            node_to_agg: self.node_to_agg,
            agg_to_node: self.agg_to_node,
        }
    }
}
