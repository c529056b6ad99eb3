// ==============================================================================
// kernel.rs - Heat-Diffusion Kernel Builder
// ==============================================================================
// Description: Diffusion parameter, dense and iterative kernel construction,
//              cancellation of the inversion step
// Author: Matt Barham
// Created: 2026-09-16
// Modified: 2026-10-19
// Version: 1.3.1
// ==============================================================================
// K = (1 - α)(I - αA)^-1, A[i][j] = weight of edge i -> j
// α = round(m * log10(E) + b, 3), m and b from a linear fit of the optimal
//     α against network edge count
// ==============================================================================

use nalgebra::{DMatrix, DVector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::KernelStrategy;
use crate::error::PropagationError;
use crate::graph::InteractionGraph;

pub const ALPHA_SLOPE: f64 = -0.02935302;
pub const ALPHA_INTERCEPT: f64 = 0.74842057;

/// How often a waiting build re-checks its cancellation token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const ITERATIVE_TOLERANCE: f64 = 1e-12;
const ITERATIVE_MAX_ITERATIONS: usize = 10_000;

/// Round half to even at `digits` decimal places
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round_ties_even() / scale
}

/// Linear model mapping log10(edge count) to the diffusion parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaModel {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for AlphaModel {
    fn default() -> Self {
        Self {
            slope: ALPHA_SLOPE,
            intercept: ALPHA_INTERCEPT,
        }
    }
}

impl AlphaModel {
    /// α for a network with `edge_count` edges; must land in (0, 1)
    pub fn alpha(&self, edge_count: f64) -> Result<f64, PropagationError> {
        let alpha = round_to(self.slope * edge_count.log10() + self.intercept, 3);

        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(PropagationError::InvalidAlpha {
                alpha,
                edges: edge_count,
            });
        }

        Ok(alpha)
    }
}

/// Cooperative cancellation with an optional deadline.
///
/// A cancelled dense build returns as soon as the token is seen, but the
/// inversion already handed to its worker thread cannot be interrupted: the
/// thread keeps its core and the n × n system until `try_inverse` returns,
/// then drops the result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Same cancellation flag, expiring `timeout` from now
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail if cancelled or past the deadline
    pub fn check(&self, started: Instant) -> Result<(), PropagationError> {
        if self.is_cancelled() {
            return Err(PropagationError::KernelCancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PropagationError::KernelDeadlineExceeded {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                });
            }
        }
        Ok(())
    }
}

/// Materialized n × n kernel
#[derive(Debug, Clone)]
pub struct DenseKernel {
    pub(crate) alpha: f64,
    pub(crate) matrix: DMatrix<f64>,
}

impl DenseKernel {
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

/// Kernel applied implicitly by solving p = (1 - α)v + α pA per vector
#[derive(Debug, Clone)]
pub struct IterativeKernel {
    pub(crate) alpha: f64,
    /// For each node j, the `(i, A[i][j])` of its incoming edges
    pub(crate) incoming: Vec<Vec<(usize, f64)>>,
    pub(crate) tolerance: f64,
    pub(crate) max_iterations: usize,
}

/// The diffusion kernel of one run
#[derive(Debug, Clone)]
pub enum DiffusionKernel {
    Dense(DenseKernel),
    Iterative(IterativeKernel),
}

impl DiffusionKernel {
    pub fn alpha(&self) -> f64 {
        match self {
            DiffusionKernel::Dense(k) => k.alpha,
            DiffusionKernel::Iterative(k) => k.alpha,
        }
    }

    pub fn strategy(&self) -> KernelStrategy {
        match self {
            DiffusionKernel::Dense(_) => KernelStrategy::Dense,
            DiffusionKernel::Iterative(_) => KernelStrategy::Iterative,
        }
    }
}

/// Builds the kernel for a weight-normalized giant component
#[derive(Debug, Clone, Default)]
pub struct KernelBuilder {
    strategy: KernelStrategy,
    alpha_model: AlphaModel,
    cancel: CancelToken,
}

impl KernelBuilder {
    pub fn new(strategy: KernelStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_alpha_model(mut self, model: AlphaModel) -> Self {
        self.alpha_model = model;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(&self, graph: &InteractionGraph) -> Result<DiffusionKernel, PropagationError> {
        let alpha = self.alpha_model.alpha(graph.edge_count() as f64)?;
        info!("Alpha: {} ({} edges)", alpha, graph.edge_count());

        let started = Instant::now();
        let kernel = match self.strategy {
            KernelStrategy::Dense => DiffusionKernel::Dense(self.build_dense(graph, alpha, started)?),
            KernelStrategy::Iterative => {
                self.cancel.check(started)?;
                DiffusionKernel::Iterative(build_iterative(graph, alpha))
            }
        };

        info!(
            "Kernel calculated ({:?}, {} nodes) in {:.2}s",
            self.strategy,
            graph.node_count(),
            started.elapsed().as_secs_f64()
        );
        Ok(kernel)
    }

    fn build_dense(
        &self,
        graph: &InteractionGraph,
        alpha: f64,
        started: Instant,
    ) -> Result<DenseKernel, PropagationError> {
        let n = graph.node_count();

        // I - αA
        let mut system = DMatrix::<f64>::identity(n, n);
        for (source, target, weight) in graph.edges() {
            system[(source, target)] -= alpha * weight;
        }

        debug!("Inverting {}x{} system", n, n);
        let inverse = self.invert(system, alpha, started)?;
        let matrix = inverse * (1.0 - alpha);

        if matrix.iter().any(|x| !x.is_finite()) {
            return Err(PropagationError::NonFiniteKernel { alpha });
        }

        Ok(DenseKernel { alpha, matrix })
    }

    /// Invert on a worker thread so the token can abort the wait
    fn invert(
        &self,
        system: DMatrix<f64>,
        alpha: f64,
        started: Instant,
    ) -> Result<DMatrix<f64>, PropagationError> {
        self.cancel.check(started)?;

        let worker = thread::spawn(move || system.try_inverse());
        self.await_inverse(worker, alpha, started)
    }

    fn await_inverse(
        &self,
        worker: JoinHandle<Option<DMatrix<f64>>>,
        alpha: f64,
        started: Instant,
    ) -> Result<DMatrix<f64>, PropagationError> {
        while !worker.is_finished() {
            if let Err(e) = self.cancel.check(started) {
                warn!(
                    "Abandoning kernel inversion after {:.2}s; its worker thread runs to completion in the background",
                    started.elapsed().as_secs_f64()
                );
                return Err(e);
            }
            thread::sleep(POLL_INTERVAL);
        }

        match worker.join() {
            Ok(Some(inverse)) => Ok(inverse),
            Ok(None) => Err(PropagationError::SingularKernel { alpha }),
            Err(_) => Err(PropagationError::KernelWorkerFailed),
        }
    }
}

fn build_iterative(graph: &InteractionGraph, alpha: f64) -> IterativeKernel {
    let mut incoming = vec![Vec::new(); graph.node_count()];
    for (source, target, weight) in graph.edges() {
        incoming[target].push((source, weight));
    }

    IterativeKernel {
        alpha,
        incoming,
        tolerance: ITERATIVE_TOLERANCE,
        max_iterations: ITERATIVE_MAX_ITERATIONS,
    }
}

impl IterativeKernel {
    pub(crate) fn solve(&self, initial: &DVector<f64>) -> DVector<f64> {
        let restart = initial * (1.0 - self.alpha);
        let mut current = restart.clone();

        for _ in 0..self.max_iterations {
            let next = DVector::from_fn(restart.len(), |j, _| {
                let inflow: f64 = self.incoming[j].iter().map(|&(i, w)| current[i] * w).sum();
                restart[j] + self.alpha * inflow
            });

            let delta = (&next - &current).amax();
            current = next;
            if delta <= self.tolerance * current.amax().max(1.0) {
                break;
            }
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cycle() -> InteractionGraph {
        let mut graph = InteractionGraph::from_edges([("A", "B"), ("B", "A")]);
        graph.normalize_weights();
        graph
    }

    #[test]
    fn test_alpha_two_edges() {
        let alpha = AlphaModel::default().alpha(2.0).unwrap();
        assert_eq!(alpha, 0.74);
    }

    #[test]
    fn test_alpha_in_unit_interval() {
        let model = AlphaModel::default();
        for edges in [1.0, 10.0, 1e3, 1e6, 1e9, 1e15] {
            let alpha = model.alpha(edges).unwrap();
            assert!(alpha > 0.0 && alpha < 1.0, "alpha {} for {} edges", alpha, edges);
        }
    }

    #[test]
    fn test_alpha_too_dense() {
        // log10(E) > b / |m| ≈ 25.5 drives α to zero
        let err = AlphaModel::default().alpha(1e26).unwrap_err();
        assert!(err.is_config());
        assert!(matches!(err, PropagationError::InvalidAlpha { .. }));

        let steep = AlphaModel {
            slope: -0.5,
            intercept: 0.74842057,
        };
        assert!(steep.alpha(1000.0).is_err());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
        assert_eq!(round_to(0.7395844, 3), 0.74);
    }

    #[test]
    fn test_dense_two_cycle() {
        let kernel = KernelBuilder::new(KernelStrategy::Dense)
            .build(&two_cycle())
            .unwrap();
        assert_eq!(kernel.alpha(), 0.74);

        let matrix = match &kernel {
            DiffusionKernel::Dense(k) => k.matrix(),
            _ => panic!("Expected dense kernel"),
        };
        assert!((matrix[(0, 0)] - 0.5747).abs() < 1e-3);
        assert!((matrix[(0, 1)] - 0.4253).abs() < 1e-3);
        assert!((matrix[(1, 0)] - 0.4253).abs() < 1e-3);
        assert!((matrix[(1, 1)] - 0.5747).abs() < 1e-3);
    }

    #[test]
    fn test_dense_is_deterministic() {
        let graph = two_cycle();
        let builder = KernelBuilder::new(KernelStrategy::Dense);
        let (a, b) = match (builder.build(&graph).unwrap(), builder.build(&graph).unwrap()) {
            (DiffusionKernel::Dense(a), DiffusionKernel::Dense(b)) => (a, b),
            _ => panic!("Expected dense kernels"),
        };
        assert_eq!(a.matrix(), b.matrix());
    }

    #[test]
    fn test_iterative_matches_dense() {
        let mut graph = InteractionGraph::from_edges([
            ("A", "B"),
            ("B", "C"),
            ("C", "A"),
            ("C", "D"),
            ("D", "B"),
            ("A", "E"),
        ]);
        graph.normalize_weights();

        let dense = match KernelBuilder::new(KernelStrategy::Dense).build(&graph).unwrap() {
            DiffusionKernel::Dense(k) => k,
            _ => panic!("Expected dense kernel"),
        };
        let iterative = match KernelBuilder::new(KernelStrategy::Iterative).build(&graph).unwrap() {
            DiffusionKernel::Iterative(k) => k,
            _ => panic!("Expected iterative kernel"),
        };

        let v = DVector::from_vec(vec![1.0, 0.0, 0.5, 0.0, 0.0]);
        let expected = dense.matrix().tr_mul(&v);
        let actual = iterative.solve(&v);
        for i in 0..5 {
            assert!((expected[i] - actual[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_cancelled_build() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = KernelBuilder::new(KernelStrategy::Dense)
            .with_cancel_token(cancel)
            .build(&two_cycle());
        assert!(matches!(result, Err(PropagationError::KernelCancelled)));
    }

    #[test]
    fn test_expired_deadline() {
        let result = KernelBuilder::new(KernelStrategy::Dense)
            .with_cancel_token(CancelToken::with_timeout(Duration::ZERO))
            .build(&two_cycle());
        assert!(matches!(
            result,
            Err(PropagationError::KernelDeadlineExceeded { .. })
        ));
    }

    #[test]
    fn test_deadline_keeps_cancel_flag() {
        let cancel = CancelToken::new();
        let limited = cancel.clone().with_deadline(Duration::from_secs(3600));
        assert!(limited.check(Instant::now()).is_ok());

        cancel.cancel();
        assert!(matches!(
            limited.check(Instant::now()),
            Err(PropagationError::KernelCancelled)
        ));
    }

    #[test]
    fn test_cancel_abandons_running_inversion() {
        let cancel = CancelToken::new();
        let builder = KernelBuilder::new(KernelStrategy::Dense).with_cancel_token(cancel.clone());

        let (release, hold) = std::sync::mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let _ = hold.recv();
            Some(DMatrix::<f64>::identity(2, 2))
        });

        cancel.cancel();
        let result = builder.await_inverse(worker, 0.5, Instant::now());
        assert!(matches!(result, Err(PropagationError::KernelCancelled)));

        // The blocked worker was left behind, not joined
        release.send(()).unwrap();
    }

    #[test]
    fn test_finished_worker_is_joined() {
        let builder = KernelBuilder::new(KernelStrategy::Dense);
        let worker = thread::spawn(|| Some(DMatrix::<f64>::identity(3, 3)));

        let inverse = builder.await_inverse(worker, 0.5, Instant::now()).unwrap();
        assert_eq!(inverse, DMatrix::identity(3, 3));

        let panicking = thread::spawn(|| -> Option<DMatrix<f64>> { panic!("worker died") });
        assert!(matches!(
            builder.await_inverse(panicking, 0.5, Instant::now()),
            Err(PropagationError::KernelWorkerFailed)
        ));
    }

    #[test]
    fn test_singular_system() {
        let builder = KernelBuilder::new(KernelStrategy::Dense);
        let result = builder.invert(DMatrix::zeros(2, 2), 0.5, Instant::now());
        assert!(matches!(result, Err(PropagationError::SingularKernel { .. })));
    }
}
