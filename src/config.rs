// ==============================================================================
// config.rs - Run Configuration
// ==============================================================================
// Description: Parameters of a propagation run and their validation
// Author: Matt Barham
// Created: 2026-09-15
// Modified: 2026-10-19
// Version: 1.2.1
// ==============================================================================

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PropagationError;

pub const DEFAULT_RANDOM_RUNS: usize = 1000;
pub const DEFAULT_SORTWIDE: f64 = 5.0;
pub const DEFAULT_OUTPUT_EXTENSION: &str = "txt";

/// Null model used to judge propagated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NullModelKind {
    /// Random source sets of the same size, shared across patients
    #[default]
    Uniform,
    /// Random source sets matching each source node's out-degree
    #[value(alias = "degree-preserving")]
    Degree,
}

impl NullModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullModelKind::Uniform => "uniform",
            NullModelKind::Degree => "degree",
        }
    }
}

/// How the diffusion kernel is realised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KernelStrategy {
    /// Materialized kernel from direct inversion of (I - αA)
    #[default]
    Dense,
    /// Fixed-point solve over the sparse adjacency per vector
    Iterative,
}

/// Parameters of one propagation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    pub graph_path: PathBuf,
    pub patient_path: PathBuf,
    pub regulator_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub output_extension: String,
    pub random_runs: usize,
    pub null_model: NullModelKind,
    /// Degree-window width as a percentage of the node count
    pub sortwide: f64,
    pub kernel: KernelStrategy,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    #[serde(with = "optional_secs")]
    pub kernel_timeout: Option<Duration>,
}

impl PropagationConfig {
    pub fn new(
        graph_path: impl Into<PathBuf>,
        patient_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            graph_path: graph_path.into(),
            patient_path: patient_path.into(),
            regulator_path: None,
            output_path: output_path.into(),
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
            random_runs: DEFAULT_RANDOM_RUNS,
            null_model: NullModelKind::default(),
            sortwide: DEFAULT_SORTWIDE,
            kernel: KernelStrategy::default(),
            seed: None,
            threads: None,
            kernel_timeout: None,
        }
    }

    pub fn with_regulator_graph(mut self, path: impl Into<PathBuf>) -> Self {
        self.regulator_path = Some(path.into());
        self
    }

    pub fn with_random_runs(mut self, runs: usize) -> Self {
        self.random_runs = runs;
        self
    }

    pub fn with_null_model(mut self, kind: NullModelKind) -> Self {
        self.null_model = kind;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelStrategy) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check parameters and the output path contract
    pub fn validate(&self) -> Result<(), PropagationError> {
        if self.random_runs == 0 {
            return Err(PropagationError::InvalidParameter(
                "random runs must be at least 1".to_string(),
            ));
        }

        if !self.sortwide.is_finite() || !(0.0..=100.0).contains(&self.sortwide) {
            return Err(PropagationError::InvalidParameter(format!(
                "sortwide must be a percentage in [0, 100], got {}",
                self.sortwide
            )));
        }

        if self.threads == Some(0) {
            return Err(PropagationError::InvalidParameter(
                "thread count must be at least 1".to_string(),
            ));
        }

        output_stem(&self.output_path, &self.output_extension)?;
        Ok(())
    }
}

/// Output path with its required `.<extension>` suffix removed.
///
/// A path that does not carry the suffix is rejected rather than renamed.
pub fn output_stem(path: &Path, extension: &str) -> Result<String, PropagationError> {
    let extension = extension.trim_start_matches('.');
    let invalid = || PropagationError::InvalidOutputPath {
        path: path.to_path_buf(),
        extension: extension.to_string(),
    };

    if extension.is_empty() {
        return Err(invalid());
    }

    let path_str = path.to_string_lossy();
    let stem = path_str
        .strip_suffix(&format!(".{}", extension))
        .ok_or_else(invalid)?;

    // A bare ".txt" or "dir/.txt" has no file stem
    if stem.is_empty() || stem.ends_with(std::path::MAIN_SEPARATOR) || stem.ends_with('/') {
        return Err(invalid());
    }

    Ok(stem.to_string())
}

mod optional_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        secs.map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| D::Error::custom(format!("invalid timeout {} seconds: {}", secs, e)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PropagationConfig::new("g.ncol", "p.tsv", "out.txt");
        assert_eq!(config.random_runs, 1000);
        assert_eq!(config.sortwide, 5.0);
        assert_eq!(config.null_model, NullModelKind::Uniform);
        assert_eq!(config.kernel, KernelStrategy::Dense);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(Path::new("res/out.txt"), "txt").unwrap(), "res/out");
        assert_eq!(output_stem(Path::new("out.tsv"), ".tsv").unwrap(), "out");

        let err = output_stem(Path::new("out.csv"), "txt").unwrap_err();
        assert!(err.is_config());
        assert!(matches!(err, PropagationError::InvalidOutputPath { .. }));

        assert!(output_stem(Path::new(".txt"), "txt").is_err());
        assert!(output_stem(Path::new("out.txt"), "").is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        let config = PropagationConfig::new("g", "p", "out.txt").with_random_runs(0);
        assert!(config.validate().unwrap_err().is_config());

        let mut config = PropagationConfig::new("g", "p", "out.txt");
        config.sortwide = 150.0;
        assert!(config.validate().is_err());

        let config = PropagationConfig::new("g", "p", "out.tsv");
        assert!(matches!(
            config.validate(),
            Err(PropagationError::InvalidOutputPath { .. })
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = PropagationConfig::new("g", "p", "out.txt").with_seed(7);
        config.kernel_timeout = Some(Duration::from_secs(30));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["null_model"], "uniform");
        assert_eq!(json["kernel_timeout"], 30.0);

        let back: PropagationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.seed, Some(7));
        assert_eq!(back.kernel_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_negative_timeout_rejected_on_load() {
        let mut json = serde_json::to_value(PropagationConfig::new("g", "p", "out.txt")).unwrap();

        json["kernel_timeout"] = serde_json::json!(-2.5);
        let err = serde_json::from_value::<PropagationConfig>(json.clone()).unwrap_err();
        assert!(err.to_string().contains("invalid timeout"));

        json["kernel_timeout"] = serde_json::Value::Null;
        let config: PropagationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.kernel_timeout, None);
    }
}
