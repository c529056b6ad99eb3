// ==============================================================================
// null_model.rs - Randomized Null Models
// ==============================================================================
// Description: Uniform and degree-preserving random source sets, propagated
//              into per-node null distributions
// Author: Matt Barham
// Created: 2026-09-17
// Modified: 2026-10-19
// Version: 1.3.0
// ==============================================================================

use nalgebra::{DMatrix, DVector};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use rayon::ThreadPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::NullModelKind;
use crate::graph::InteractionGraph;
use crate::kernel::round_to;
use crate::propagator::{propagate_sets, Propagator};

/// Null distribution of every node: one column per random run
#[derive(Debug, Clone, PartialEq)]
pub struct NullEnsemble {
    samples: DMatrix<f64>,
}

impl NullEnsemble {
    pub fn from_columns(dimension: usize, columns: &[DVector<f64>]) -> Self {
        let samples = if columns.is_empty() {
            DMatrix::zeros(dimension, 0)
        } else {
            DMatrix::from_columns(columns)
        };
        Self { samples }
    }

    pub fn from_matrix(samples: DMatrix<f64>) -> Self {
        Self { samples }
    }

    /// Number of nodes
    pub fn dimension(&self) -> usize {
        self.samples.nrows()
    }

    /// Samples per node
    pub fn runs(&self) -> usize {
        self.samples.ncols()
    }

    pub fn samples(&self) -> &DMatrix<f64> {
        &self.samples
    }

    /// The null samples of one node
    pub fn node_samples(&self, node: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.runs()).map(move |run| self.samples[(node, run)])
    }
}

/// Out-degree buckets and ranks used by degree-preserving sampling
#[derive(Debug, Clone)]
pub struct DegreeIndex {
    out_degrees: Vec<usize>,
    by_degree: HashMap<usize, Vec<usize>>,
    /// Nodes sorted by ascending out-degree, ties in node order
    ranked: Vec<usize>,
    /// 1-based position of each node in `ranked`
    rank_of: Vec<usize>,
    window: usize,
}

impl DegreeIndex {
    /// `sortwide` is the window half-width as a percentage of the node count
    pub fn new(graph: &InteractionGraph, sortwide: f64) -> Self {
        let out_degrees = graph.out_degrees();
        let n = out_degrees.len();

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by_key(|&node| out_degrees[node]);

        let mut rank_of = vec![0; n];
        let mut by_degree: HashMap<usize, Vec<usize>> = HashMap::new();
        for (pos, &node) in ranked.iter().enumerate() {
            rank_of[node] = pos + 1;
            by_degree.entry(out_degrees[node]).or_default().push(node);
        }

        let window = round_to(n as f64 * sortwide / 100.0, 0) as usize;

        Self {
            out_degrees,
            by_degree,
            ranked,
            rank_of,
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Replacement pool for a source node.
    ///
    /// Nodes of exactly the same out-degree when there are at least twice the
    /// window of them, otherwise every node ranked within the window.
    pub fn candidates(&self, node: usize) -> &[usize] {
        let degree = self.out_degrees[node];
        if let Some(bucket) = self.by_degree.get(&degree) {
            if bucket.len() >= 2 * self.window {
                return bucket;
            }
        }

        let rank = self.rank_of[node];
        let lo = rank.saturating_sub(self.window).max(1);
        let hi = (rank + self.window).min(self.ranked.len());
        &self.ranked[lo - 1..hi]
    }
}

/// Cache key of a null ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullKey {
    /// Uniform ensembles depend only on the number of source nodes
    SourceCount(usize),
    /// Degree-preserving ensembles depend on the patient's own sources
    Patient(usize),
}

/// Patients scored against the same null ensemble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullGroup {
    pub key: NullKey,
    /// Patient columns, ascending
    pub patients: Vec<usize>,
}

/// How random source sets are drawn
#[derive(Debug, Clone)]
pub enum NullModelStrategy {
    Uniform { node_count: usize },
    DegreePreserving(DegreeIndex),
}

impl NullModelStrategy {
    pub fn new(kind: NullModelKind, graph: &InteractionGraph, sortwide: f64) -> Self {
        match kind {
            NullModelKind::Uniform => NullModelStrategy::Uniform {
                node_count: graph.node_count(),
            },
            NullModelKind::Degree => {
                NullModelStrategy::DegreePreserving(DegreeIndex::new(graph, sortwide))
            }
        }
    }

    pub fn kind(&self) -> NullModelKind {
        match self {
            NullModelStrategy::Uniform { .. } => NullModelKind::Uniform,
            NullModelStrategy::DegreePreserving(_) => NullModelKind::Degree,
        }
    }

    pub fn key(&self, patient: usize, sources: &[usize]) -> NullKey {
        match self {
            NullModelStrategy::Uniform { .. } => NullKey::SourceCount(sources.len()),
            NullModelStrategy::DegreePreserving(_) => NullKey::Patient(patient),
        }
    }

    /// Patients that can share one null ensemble, in order of first appearance
    pub fn group(&self, source_sets: &[&[usize]]) -> Vec<NullGroup> {
        let mut groups: Vec<NullGroup> = Vec::new();
        let mut slot: HashMap<NullKey, usize> = HashMap::new();

        for (patient, sources) in source_sets.iter().enumerate() {
            let key = self.key(patient, sources);
            match slot.get(&key) {
                Some(&i) => groups[i].patients.push(patient),
                None => {
                    slot.insert(key, groups.len());
                    groups.push(NullGroup {
                        key,
                        patients: vec![patient],
                    });
                }
            }
        }
        groups
    }

    /// Draw `runs` random source sets matching `sources`
    pub fn draw<R: Rng + ?Sized>(
        &self,
        sources: &[usize],
        runs: usize,
        rng: &mut R,
    ) -> Vec<Vec<usize>> {
        match self {
            NullModelStrategy::Uniform { node_count } => {
                // Without replacement from the full node list
                (0..runs)
                    .map(|_| index::sample(rng, *node_count, sources.len()).into_vec())
                    .collect()
            }
            NullModelStrategy::DegreePreserving(degrees) => {
                let pools: Vec<&[usize]> = sources.iter().map(|&u| degrees.candidates(u)).collect();
                (0..runs)
                    .map(|_| {
                        pools
                            .iter()
                            .zip(sources)
                            .map(|(pool, &u)| pool.choose(rng).copied().unwrap_or(u))
                            .collect()
                    })
                    .collect()
            }
        }
    }
}

/// Draws and propagates null ensembles.
///
/// Ensembles are not kept: callers score a whole [`NullGroup`] against one
/// ensemble and drop it before asking for the next.
pub struct NullModelSampler<'k, P: Propagator + ?Sized> {
    strategy: NullModelStrategy,
    kernel: &'k P,
    runs: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl<'k, P: Propagator + ?Sized> NullModelSampler<'k, P> {
    pub fn new(strategy: NullModelStrategy, kernel: &'k P, runs: usize) -> Self {
        Self {
            strategy,
            kernel,
            runs,
            pool: None,
        }
    }

    /// Run propagations on a dedicated pool instead of the global one
    pub fn with_thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn strategy(&self) -> &NullModelStrategy {
        &self.strategy
    }

    /// Null ensemble for a source set
    pub fn ensemble<R: Rng + ?Sized>(&self, sources: &[usize], rng: &mut R) -> NullEnsemble {
        debug!(
            "Drawing {} random source sets for {} sources",
            self.runs,
            sources.len()
        );
        let source_sets = self.strategy.draw(sources, self.runs, rng);

        let kernel = self.kernel;
        let columns = match &self.pool {
            Some(pool) => pool.install(|| propagate_sets(kernel, &source_sets)),
            None => propagate_sets(kernel, &source_sets),
        };
        NullEnsemble::from_columns(kernel.dimension(), &columns)
    }
}
