// ==============================================================================
// regulatory.rs - Regulator-Target Projection
// ==============================================================================
// Description: One-hop projection of propagated gene signal onto the targets of
//              a regulator -> target gene network
// Author: Matt Barham
// Created: 2026-09-22
// Modified: 2026-10-09
// Version: 1.0.1
// ==============================================================================

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::error::{InputKind, PropagationError};
use crate::graph::InteractionGraph;
use crate::null_model::NullEnsemble;

/// Counts recorded in the run manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegulatorySummary {
    pub shared_nodes: usize,
    pub regulators: usize,
    pub targets: usize,
    pub edges: usize,
}

/// A single weighted regulator -> target contribution
#[derive(Debug, Clone, Copy, PartialEq)]
struct Term {
    /// Index of the regulator in the interaction graph
    regulator: usize,
    /// Position of the target in [`RegulatoryProjection::targets`]
    target: usize,
    /// (1 - α) · w(regulator, target)
    coefficient: f64,
}

/// Linear map from interaction-graph signal to target-gene signal.
///
/// For every target `v`:
/// `tf[v] = Σ (1 - α) · p[u] · w(u, v)` over regulator edges `u -> v` whose
/// regulator `u` lies in the interaction graph. `w` is normalized by the
/// regulator's out-degree within the regulator network.
#[derive(Debug, Clone)]
pub struct RegulatoryProjection {
    targets: Vec<String>,
    terms: Vec<Term>,
    dimension: usize,
    summary: RegulatorySummary,
}

impl RegulatoryProjection {
    /// Build the projection.
    ///
    /// # Arguments
    /// * `regulators` - regulator network with normalized edge weights
    /// * `graph` - giant component of the interaction graph
    /// * `alpha` - the kernel's α
    ///
    /// # Errors
    /// `NoOverlap` when the two networks share no identifiers.
    pub fn new(
        regulators: &InteractionGraph,
        graph: &InteractionGraph,
        alpha: f64,
    ) -> Result<Self, PropagationError> {
        let shared_nodes = regulators.shared_nodes(graph);
        if shared_nodes == 0 {
            return Err(PropagationError::NoOverlap {
                input: InputKind::RegulatorGraph,
                details: format!(
                    "none of its {} nodes appear in the {}-node giant component",
                    regulators.node_count(),
                    graph.node_count()
                ),
            });
        }

        // (regulator in graph, target in regulator network, coefficient)
        let mut raw_terms = Vec::new();
        let mut regulator_count = 0;
        for (idx, id) in regulators.node_ids().enumerate() {
            let Some(regulator) = graph.index_of(id) else {
                continue;
            };
            let before = raw_terms.len();
            for (target, weight) in regulators.out_edges(idx) {
                raw_terms.push((regulator, target, (1.0 - alpha) * weight));
            }
            if raw_terms.len() > before {
                regulator_count += 1;
            }
        }

        // Targets in order of first appearance in the regulator network
        let mut target_nodes: Vec<usize> = raw_terms.iter().map(|&(_, t, _)| t).collect();
        target_nodes.sort_unstable();
        target_nodes.dedup();
        let slot: HashMap<usize, usize> = target_nodes
            .iter()
            .enumerate()
            .map(|(pos, &node)| (node, pos))
            .collect();

        let targets: Vec<String> = target_nodes
            .iter()
            .map(|&node| regulators.node_id(node).to_string())
            .collect();
        let terms: Vec<Term> = raw_terms
            .into_iter()
            .map(|(regulator, target, coefficient)| Term {
                regulator,
                target: slot[&target],
                coefficient,
            })
            .collect();

        let summary = RegulatorySummary {
            shared_nodes,
            regulators: regulator_count,
            targets: targets.len(),
            edges: terms.len(),
        };
        info!(
            "Regulator network: {} shared nodes, {} active regulators, {} targets",
            summary.shared_nodes, summary.regulators, summary.targets
        );

        Ok(Self {
            targets,
            terms,
            dimension: graph.node_count(),
            summary,
        })
    }

    /// Target gene identifiers, aligned with projected vectors
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn summary(&self) -> RegulatorySummary {
        self.summary
    }

    /// Project one propagated vector onto the targets
    pub fn project(&self, propagated: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(propagated.len(), self.dimension);

        let mut projected = DVector::zeros(self.targets.len());
        for term in &self.terms {
            projected[term.target] += term.coefficient * propagated[term.regulator];
        }
        projected
    }

    /// Apply the same projection to every run of a stage-one null ensemble
    pub fn project_ensemble(&self, null: &NullEnsemble) -> NullEnsemble {
        let samples = null.samples();
        let runs = null.runs();

        let mut projected = DMatrix::zeros(self.targets.len(), runs);
        for term in &self.terms {
            for run in 0..runs {
                projected[(term.target, run)] += term.coefficient * samples[(term.regulator, run)];
            }
        }
        NullEnsemble::from_matrix(projected)
    }
}
