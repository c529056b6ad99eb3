// ==============================================================================
// scoring.rs - Significance Scoring
// ==============================================================================
// Description: Per-node Z-scores of propagated signal against null ensembles
// Author: Matt Barham
// Created: 2026-09-18
// Modified: 2026-10-05
// Version: 1.1.0
// ==============================================================================

use nalgebra::DVector;
use serde::Serialize;

use crate::null_model::NullEnsemble;

/// Observed signal of one node and its standing in the null distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeScore {
    pub real_value: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    pub mean: f64,
    pub std: f64,
}

/// Mean and population standard deviation of a null distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NullStats {
    pub mean: f64,
    pub std: f64,
}

/// Summarize null samples.
///
/// # Algorithm
/// - mean: μ = Σ(x) / n
/// - std: σ = sqrt(Σ(x - μ)² / n)
/// - identical samples give σ = 0 exactly, so rounding in μ cannot leave a
///   spurious tiny σ behind
pub fn null_stats(samples: impl IntoIterator<Item = f64>) -> NullStats {
    let samples: Vec<f64> = samples.into_iter().collect();
    if samples.is_empty() {
        return NullStats { mean: 0.0, std: 0.0 };
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;

    let first = samples[0];
    if samples.iter().all(|&x| x == first) {
        return NullStats { mean, std: 0.0 };
    }

    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    NullStats {
        mean,
        std: variance.sqrt(),
    }
}

/// Z of an observed value; 0 when the null has no spread
pub fn z_score(real_value: f64, stats: NullStats) -> f64 {
    if stats.std == 0.0 {
        return 0.0;
    }
    let z = (real_value - stats.mean) / stats.std;
    if z.is_finite() {
        z
    } else {
        0.0
    }
}

/// Score every node of a propagated vector against its null ensemble
pub fn score_nodes(real_values: &DVector<f64>, null: &NullEnsemble) -> Vec<NodeScore> {
    debug_assert_eq!(real_values.len(), null.dimension());

    real_values
        .iter()
        .enumerate()
        .map(|(node, &real_value)| {
            let stats = null_stats(null.node_samples(node));
            NodeScore {
                real_value,
                z: z_score(real_value, stats),
                mean: stats.mean,
                std: stats.std,
            }
        })
        .collect()
}

/// Scores of one patient for every node of a stage
#[derive(Debug, Clone)]
pub struct PatientScores {
    pub patient: String,
    /// Source nodes of the patient found in the giant component
    pub source_count: usize,
    pub scores: Vec<NodeScore>,
}

/// All patients' scores over one node set (genes or regulated targets)
#[derive(Debug, Clone, Default)]
pub struct StageScores {
    pub node_ids: Vec<String>,
    pub patients: Vec<PatientScores>,
}

impl StageScores {
    pub fn new(node_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            patients: Vec::new(),
        }
    }

    pub fn patient(&self, patient: &str) -> Option<&PatientScores> {
        self.patients.iter().find(|p| p.patient == patient)
    }

    /// Score of a node for a patient, by identifier
    pub fn score(&self, patient: &str, node_id: &str) -> Option<&NodeScore> {
        let node = self.node_ids.iter().position(|id| id == node_id)?;
        self.patient(patient).and_then(|p| p.scores.get(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_null_stats() {
        // [1, 2, 3]: mean 2, population σ = sqrt(2/3) ≈ 0.8165
        let stats = null_stats([1.0, 2.0, 3.0]);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.std - 0.8165).abs() < 1e-4);
    }

    #[test]
    fn test_constant_null_gives_zero() {
        let stats = null_stats([0.1; 7]);
        assert_eq!(stats.std, 0.0);

        let z = z_score(5.0, stats);
        assert_eq!(z, 0.0);
        assert!(z.is_finite());
    }

    #[test]
    fn test_z_score() {
        let stats = NullStats { mean: 1.0, std: 0.5 };
        assert!((z_score(2.0, stats) - 2.0).abs() < 1e-12);
        assert!((z_score(0.5, stats) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_null() {
        let stats = null_stats(std::iter::empty());
        assert_eq!(stats, NullStats { mean: 0.0, std: 0.0 });
    }

    #[test]
    fn test_score_nodes() {
        // Node 0: varying null, node 1: constant null
        let samples = DMatrix::from_row_slice(2, 4, &[0.0, 1.0, 0.0, 1.0, 0.3, 0.3, 0.3, 0.3]);
        let null = NullEnsemble::from_matrix(samples);
        let real = DVector::from_vec(vec![1.5, 0.9]);

        let scores = score_nodes(&real, &null);
        assert_eq!(scores.len(), 2);

        assert!((scores[0].mean - 0.5).abs() < 1e-12);
        assert!((scores[0].std - 0.5).abs() < 1e-12);
        assert!((scores[0].z - 2.0).abs() < 1e-12);

        assert_eq!(scores[1].std, 0.0);
        assert_eq!(scores[1].z, 0.0);
        assert_eq!(scores[1].real_value, 0.9);
    }

    #[test]
    fn test_stage_lookup() {
        let mut stage = StageScores::new(vec!["A".to_string(), "B".to_string()]);
        let score = NodeScore {
            real_value: 1.0,
            z: 2.0,
            mean: 0.0,
            std: 0.5,
        };
        stage.patients.push(PatientScores {
            patient: "p1".to_string(),
            source_count: 1,
            scores: vec![score, score],
        });

        assert_eq!(stage.score("p1", "B"), Some(&score));
        assert!(stage.score("p2", "A").is_none());
        assert!(stage.score("p1", "C").is_none());
    }
}
