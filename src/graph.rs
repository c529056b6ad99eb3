// ==============================================================================
// graph.rs - Interaction Graph Loader
// ==============================================================================
// Description: Directed interaction graph, giant-component restriction and
//              out-degree edge weight normalization
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-10-05
// Version: 1.2.0
// ==============================================================================
// Format: whitespace-delimited edge list, one directed edge per line
// Example:
//   # source target
//   P04637 Q00987
//   Q00987 P04637
//   P04637 P38398   extra columns are ignored
// ==============================================================================

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

use crate::input;

/// Errors that can occur while reading an edge list
#[derive(Error, Debug)]
pub enum EdgeListError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid edge at line {line}: {details}")]
    InvalidFormat { line: usize, details: String },
}

/// Node and edge counts, recorded in the run manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Directed gene/protein interaction graph.
///
/// Node indices are dense (`0..node_count`) and follow the order in which
/// identifiers first appeared in the edge list. Every vector and matrix in the
/// engine is aligned to this ordering. Edge weights start at 1.0 and are
/// overwritten by [`InteractionGraph::normalize_weights`].
#[derive(Debug, Clone, Default)]
pub struct InteractionGraph {
    graph: DiGraph<String, f64>,
    index: HashMap<String, NodeIndex>,
}

impl InteractionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an edge list from a file (plain or gzip)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EdgeListError> {
        let reader = input::open_text(path.as_ref())?;
        Self::from_reader(reader)
    }

    /// Read an edge list.
    ///
    /// Blank lines and lines starting with `#` are skipped, trailing whitespace
    /// is ignored and repeated edges collapse into one.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, EdgeListError> {
        let mut graph = Self::new();

        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut fields = trimmed.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(source), Some(target)) => graph.add_edge(source, target),
                _ => {
                    return Err(EdgeListError::InvalidFormat {
                        line: idx + 1,
                        details: format!("expected 'source target', found '{}'", trimmed),
                    })
                }
            }
        }

        Ok(graph)
    }

    /// Build a graph from `(source, target)` pairs
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = Self::new();
        for (source, target) in edges {
            graph.add_edge(source, target);
        }
        graph
    }

    /// Add a directed edge; a repeated edge is a no-op
    pub fn add_edge(&mut self, source: &str, target: &str) {
        let s = self.intern(source);
        let t = self.intern(target);
        if self.graph.find_edge(s, t).is_none() {
            self.graph.add_edge(s, t, 1.0);
        }
    }

    fn intern(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            nodes: self.node_count(),
            edges: self.edge_count(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Dense index of a node identifier
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|idx| idx.index())
    }

    /// Identifier at a dense index
    pub fn node_id(&self, idx: usize) -> &str {
        &self.graph[NodeIndex::new(idx)]
    }

    /// Node identifiers in index order
    pub fn node_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.graph.node_indices().map(move |idx| self.graph[idx].as_str())
    }

    pub fn out_degree(&self, idx: usize) -> usize {
        self.graph
            .neighbors_directed(NodeIndex::new(idx), Direction::Outgoing)
            .count()
    }

    /// Out-degree of every node, in index order
    pub fn out_degrees(&self) -> Vec<usize> {
        (0..self.node_count()).map(|idx| self.out_degree(idx)).collect()
    }

    /// `(source, target, weight)` for every edge
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
    }

    /// `(target, weight)` for every outgoing edge of a node
    pub fn out_edges(&self, idx: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(idx), Direction::Outgoing)
            .map(|e| (e.target().index(), *e.weight()))
    }

    /// Induced subgraph of the largest weakly-connected component.
    ///
    /// Ties go to the component holding the earliest-loaded node. Node order is
    /// preserved.
    pub fn giant_component(&self) -> InteractionGraph {
        let n = self.node_count();
        if n == 0 {
            return InteractionGraph::new();
        }

        let mut components = UnionFind::<usize>::new(n);
        for edge in self.graph.edge_references() {
            components.union(edge.source().index(), edge.target().index());
        }
        let labels = components.into_labeling();

        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for &label in &labels {
            *sizes.entry(label).or_insert(0) += 1;
        }

        // Walk in node order so the earliest component wins a tie
        let mut giant = labels[0];
        for &label in &labels {
            if sizes[&label] > sizes[&giant] {
                giant = label;
            }
        }

        let graph = self.graph.filter_map(
            |idx, id| (labels[idx.index()] == giant).then(|| id.clone()),
            |_, weight| Some(*weight),
        );
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].clone(), idx))
            .collect();

        InteractionGraph { graph, index }
    }

    /// Set every edge weight to `1 / out_degree(source)`
    pub fn normalize_weights(&mut self) {
        let degrees = self.out_degrees();
        let edge_ids: Vec<_> = self.graph.edge_indices().collect();

        for edge in edge_ids {
            if let Some((source, _)) = self.graph.edge_endpoints(edge) {
                self.graph[edge] = 1.0 / degrees[source.index()] as f64;
            }
        }
    }

    /// Number of node identifiers shared with another graph
    pub fn shared_nodes(&self, other: &InteractionGraph) -> usize {
        self.node_ids().filter(|id| other.contains(id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(contents: &str) -> InteractionGraph {
        InteractionGraph::from_reader(Cursor::new(contents)).unwrap()
    }

    #[test]
    fn test_parse_edge_list() {
        let graph = parse("# comment\nA B\nB C extra column\n\nC A   \n");

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(graph.index_of("C"), Some(2));
        assert_eq!(graph.node_id(1), "B");
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = parse("A B\nA B\nB A\n");
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_invalid_line() {
        let result = InteractionGraph::from_reader(Cursor::new("A B\nlonely\n"));
        match result.unwrap_err() {
            EdgeListError::InvalidFormat { line, .. } => assert_eq!(line, 2),
            other => panic!("Expected InvalidFormat error, got {:?}", other),
        }
    }

    #[test]
    fn test_giant_component() {
        // {A, B, C} is the larger component, {X, Y} is dropped
        let graph = InteractionGraph::from_edges([("X", "Y"), ("A", "B"), ("C", "B")]);
        let giant = graph.giant_component();

        assert_eq!(giant.node_count(), 3);
        assert_eq!(giant.edge_count(), 2);
        assert!(!giant.contains("X"));
        assert_eq!(giant.node_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(giant.index_of("C"), Some(2));
    }

    #[test]
    fn test_giant_component_tie_prefers_first() {
        let graph = InteractionGraph::from_edges([("X", "Y"), ("A", "B")]);
        let giant = graph.giant_component();

        assert_eq!(giant.node_ids().collect::<Vec<_>>(), vec!["X", "Y"]);
    }

    #[test]
    fn test_giant_component_is_weak() {
        // A -> B <- C has no directed path A..C but is weakly connected
        let graph = InteractionGraph::from_edges([("A", "B"), ("C", "B"), ("D", "E")]);
        assert_eq!(graph.giant_component().node_count(), 3);
    }

    #[test]
    fn test_normalize_weights() {
        let mut graph = InteractionGraph::from_edges([("A", "B"), ("A", "C"), ("A", "D"), ("B", "A")]);
        graph.normalize_weights();

        for (source, _, weight) in graph.edges() {
            let expected = 1.0 / graph.out_degree(source) as f64;
            assert!((weight - expected).abs() < 1e-12);
        }
        assert_eq!(graph.out_degrees(), vec![3, 1, 0, 0]);

        let from_a: Vec<f64> = graph.out_edges(0).map(|(_, w)| w).collect();
        assert_eq!(from_a.len(), 3);
        assert!(from_a.iter().all(|w| (w - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_shared_nodes() {
        let a = InteractionGraph::from_edges([("A", "B")]);
        let b = InteractionGraph::from_edges([("B", "C"), ("D", "E")]);
        assert_eq!(a.shared_nodes(&b), 1);
        assert_eq!(b.shared_nodes(&a), 1);
    }
}
