// ==============================================================================
// propagator.rs - Signal Propagation
// ==============================================================================
// Description: p = v·K for real and randomized source vectors
// Author: Matt Barham
// Created: 2026-09-16
// Modified: 2026-10-12
// Version: 1.1.0
// ==============================================================================

use nalgebra::DVector;
use rayon::prelude::*;

use crate::kernel::{DenseKernel, DiffusionKernel, IterativeKernel};

/// Anything that diffuses a node-aligned vector through the network.
///
/// Implementations are read-only after construction so a single kernel can be
/// shared by every worker thread.
pub trait Propagator: Sync {
    /// Length of the vectors this propagator accepts
    fn dimension(&self) -> usize;

    /// Row-vector product `v·K`
    fn propagate(&self, initial: &DVector<f64>) -> DVector<f64>;
}

impl Propagator for DenseKernel {
    fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn propagate(&self, initial: &DVector<f64>) -> DVector<f64> {
        // (v·K)ᵀ = Kᵀ·vᵀ
        self.matrix.tr_mul(initial)
    }
}

impl Propagator for IterativeKernel {
    fn dimension(&self) -> usize {
        self.incoming.len()
    }

    fn propagate(&self, initial: &DVector<f64>) -> DVector<f64> {
        self.solve(initial)
    }
}

impl Propagator for DiffusionKernel {
    fn dimension(&self) -> usize {
        match self {
            DiffusionKernel::Dense(k) => k.dimension(),
            DiffusionKernel::Iterative(k) => k.dimension(),
        }
    }

    fn propagate(&self, initial: &DVector<f64>) -> DVector<f64> {
        match self {
            DiffusionKernel::Dense(k) => k.propagate(initial),
            DiffusionKernel::Iterative(k) => k.propagate(initial),
        }
    }
}

/// Binary vector with 1.0 at every listed node
pub fn indicator_vector(dimension: usize, nodes: &[usize]) -> DVector<f64> {
    let mut vector = DVector::zeros(dimension);
    for &node in nodes {
        vector[node] = 1.0;
    }
    vector
}

/// Propagate each source set as a binary vector, in parallel
pub fn propagate_sets<P>(kernel: &P, source_sets: &[Vec<usize>]) -> Vec<DVector<f64>>
where
    P: Propagator + ?Sized,
{
    let n = kernel.dimension();
    source_sets
        .par_iter()
        .map(|nodes| kernel.propagate(&indicator_vector(n, nodes)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelStrategy;
    use crate::graph::InteractionGraph;
    use crate::kernel::KernelBuilder;

    fn kernel(strategy: KernelStrategy) -> DiffusionKernel {
        let mut graph = InteractionGraph::from_edges([("A", "B"), ("B", "A")]);
        graph.normalize_weights();
        KernelBuilder::new(strategy).build(&graph).unwrap()
    }

    #[test]
    fn test_two_cycle_propagation() {
        for strategy in [KernelStrategy::Dense, KernelStrategy::Iterative] {
            let k = kernel(strategy);
            let p = k.propagate(&DVector::from_vec(vec![1.0, 0.0]));
            assert!((p[0] - 0.5747).abs() < 1e-3, "{:?}: {}", strategy, p[0]);
            assert!((p[1] - 0.4253).abs() < 1e-3, "{:?}: {}", strategy, p[1]);
        }
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        for strategy in [KernelStrategy::Dense, KernelStrategy::Iterative] {
            let p = kernel(strategy).propagate(&DVector::zeros(2));
            assert!(p.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_linearity() {
        let k = kernel(KernelStrategy::Dense);
        let a = k.propagate(&DVector::from_vec(vec![1.0, 0.0]));
        let b = k.propagate(&DVector::from_vec(vec![0.0, 1.0]));
        let ab = k.propagate(&DVector::from_vec(vec![2.0, 3.0]));

        let combined = a * 2.0 + b * 3.0;
        assert!((ab - combined).amax() < 1e-12);
    }

    #[test]
    fn test_propagate_sets_matches_single() {
        let k = kernel(KernelStrategy::Dense);
        let sets = vec![vec![0], vec![1], vec![0, 1], vec![]];
        let results = propagate_sets(&k, &sets);

        assert_eq!(results.len(), 4);
        for (set, result) in sets.iter().zip(&results) {
            let expected = k.propagate(&indicator_vector(2, set));
            assert_eq!(&expected, result);
        }
        assert!(results[3].iter().all(|&x| x == 0.0));
    }
}
