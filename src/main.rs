// ==============================================================================
// main.rs - Network Propagator Entry Point
// ==============================================================================
// Description: Command-line entry point for patient network propagation
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-10-19
// Version: 1.2.1
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use network_propagator::config::{DEFAULT_OUTPUT_EXTENSION, DEFAULT_RANDOM_RUNS, DEFAULT_SORTWIDE};
use network_propagator::{KernelStrategy, NetworkPropagation, NullModelKind, PropagationConfig, RunLogger};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interaction graph edge list, one "source target" pair per line
    #[arg(short, long, env = "NETPROP_GRAPH")]
    graph: PathBuf,

    /// Tab-separated node x patient table of source weights
    #[arg(short, long, env = "NETPROP_PATIENT_FILE")]
    patient_file: PathBuf,

    /// Combined result table; must end in the output extension
    #[arg(short, long, env = "NETPROP_OUTPUT_FILE")]
    output_file: PathBuf,

    /// Regulator -> target gene edge list for the second stage
    #[arg(short = 't', long, env = "NETPROP_TF_TARGET_NETWORK")]
    tf_target_network: Option<PathBuf>,

    /// Random source sets drawn per null ensemble
    #[arg(short, long, env = "NETPROP_RANDOM_RUNS", default_value_t = DEFAULT_RANDOM_RUNS)]
    random_runs: usize,

    /// Null model (uniform or degree)
    #[arg(long, value_enum, env = "NETPROP_NULL_MODEL", default_value_t = NullModelKind::Uniform)]
    null_model: NullModelKind,

    /// Shorthand for --null-model degree
    #[arg(short, long)]
    degree_propagation: bool,

    /// Degree window half-width, percent of the node count
    #[arg(long, env = "NETPROP_SORTWIDE", default_value_t = DEFAULT_SORTWIDE)]
    sortwide: f64,

    /// Kernel strategy (dense or iterative)
    #[arg(long, value_enum, env = "NETPROP_KERNEL", default_value_t = KernelStrategy::Dense)]
    kernel: KernelStrategy,

    /// Seed for reproducible null models
    #[arg(long, env = "NETPROP_SEED")]
    seed: Option<u64>,

    /// Worker threads for null-model propagation
    #[arg(long, env = "NETPROP_THREADS")]
    threads: Option<usize>,

    /// Abort kernel construction after this many seconds
    #[arg(long, env = "NETPROP_KERNEL_TIMEOUT_SECS")]
    kernel_timeout_secs: Option<f64>,

    /// Required extension of the output file
    #[arg(long, env = "NETPROP_OUTPUT_EXTENSION", default_value = DEFAULT_OUTPUT_EXTENSION)]
    output_extension: String,

    /// Also write the run log to this file
    #[arg(long, env = "NETPROP_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<PropagationConfig> {
        let kernel_timeout = match self.kernel_timeout_secs {
            Some(secs) => Some(
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid kernel timeout: {} seconds", secs))?,
            ),
            None => None,
        };

        let null_model = if self.degree_propagation {
            NullModelKind::Degree
        } else {
            self.null_model
        };

        let mut config = PropagationConfig::new(self.graph, self.patient_file, self.output_file)
            .with_random_runs(self.random_runs)
            .with_null_model(null_model)
            .with_kernel(self.kernel);
        config.regulator_path = self.tf_target_network;
        config.sortwide = self.sortwide;
        config.seed = self.seed;
        config.threads = self.threads;
        config.kernel_timeout = kernel_timeout;
        config.output_extension = self.output_extension;

        Ok(config)
    }

    /// Validated configuration and its logger; nothing is created on disk
    /// for a configuration that would be rejected
    fn into_run(self) -> Result<(PropagationConfig, RunLogger)> {
        let log_file = self.log_file.clone();
        let config = self.into_config()?;
        config.validate().context("Invalid configuration")?;

        let mut logger = RunLogger::new();
        if let Some(path) = log_file {
            logger = logger.with_log_file(path);
        }
        Ok((config, logger))
    }
}

fn main() -> Result<()> {
    let (config, logger) = Args::parse().into_run()?;
    let output_path = config.output_path.clone();

    let outcome = NetworkPropagation::new(config)
        .with_logger(logger)
        .run()
        .with_context(|| format!("Network propagation failed for {:?}", output_path))?;

    println!(
        "Run {} complete (alpha {}): {} files written",
        outcome.run_id,
        outcome.alpha,
        outcome.outputs.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_shorthand() {
        let args = Args::try_parse_from([
            "network-propagator",
            "-g",
            "graph.txt",
            "-p",
            "patients.tsv",
            "-o",
            "out.txt",
            "-d",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.null_model, NullModelKind::Degree);
        assert_eq!(config.random_runs, 1000);
        assert_eq!(config.output_extension, "txt");
    }

    #[test]
    fn test_full_arguments() {
        let args = Args::try_parse_from([
            "network-propagator",
            "--graph",
            "graph.txt",
            "--patient-file",
            "patients.tsv",
            "--output-file",
            "out.tsv",
            "-t",
            "tf.txt",
            "-r",
            "250",
            "--null-model",
            "degree-preserving",
            "--sortwide",
            "10",
            "--kernel",
            "iterative",
            "--seed",
            "42",
            "--threads",
            "4",
            "--kernel-timeout-secs",
            "1.5",
            "--output-extension",
            "tsv",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.regulator_path, Some(PathBuf::from("tf.txt")));
        assert_eq!(config.random_runs, 250);
        assert_eq!(config.null_model, NullModelKind::Degree);
        assert_eq!(config.sortwide, 10.0);
        assert_eq!(config.kernel, KernelStrategy::Iterative);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.kernel_timeout, Some(Duration::from_millis(1500)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let args = Args::try_parse_from([
            "network-propagator",
            "-g",
            "graph.txt",
            "-p",
            "patients.tsv",
            "-o",
            "out.txt",
            "--kernel-timeout-secs=-3",
        ])
        .unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_rejected_config_leaves_no_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let args = Args::try_parse_from([
            "network-propagator",
            "-g",
            "graph.txt",
            "-p",
            "patients.tsv",
            "-o",
            "out.csv",
            "--log-file",
            log.to_str().unwrap(),
        ])
        .unwrap();

        assert!(args.into_run().is_err());
        assert!(!log.exists());
    }

    #[test]
    fn test_valid_config_keeps_log_file() {
        let args = Args::try_parse_from([
            "network-propagator",
            "-g",
            "graph.txt",
            "-p",
            "patients.tsv",
            "-o",
            "out.txt",
            "--log-file",
            "run.log",
        ])
        .unwrap();

        let (config, _logger) = args.into_run().unwrap();
        assert_eq!(config.output_extension, "txt");
    }
}
