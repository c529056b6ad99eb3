// ==============================================================================
// pipeline.rs - Network Propagation Run
// ==============================================================================
// Description: Loads the inputs, builds the kernel, scores every patient against
//              its null model and writes the result tables
// Author: Matt Barham
// Created: 2026-09-25
// Modified: 2026-10-19
// Version: 1.3.0
// ==============================================================================

use chrono::Utc;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PropagationConfig;
use crate::error::{InputKind, PropagationError};
use crate::graph::InteractionGraph;
use crate::input;
use crate::kernel::{AlphaModel, CancelToken, KernelBuilder};
use crate::logging::RunLogger;
use crate::null_model::{NullModelSampler, NullModelStrategy};
use crate::output::{InputFingerprint, OutputPaths, PatientSummary, ResultWriter, RunManifest};
use crate::patients::{PatientTable, PatientVector};
use crate::propagator::Propagator;
use crate::regulatory::RegulatoryProjection;
use crate::scoring::{score_nodes, PatientScores, StageScores};

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub alpha: f64,
    /// Scores over the giant component
    pub genes: StageScores,
    /// Scores over regulated targets, when a regulator network was given
    pub targets: Option<StageScores>,
    pub outputs: Vec<PathBuf>,
    pub manifest: RunManifest,
}

/// One invocation of the propagation engine
pub struct NetworkPropagation {
    config: PropagationConfig,
    run_id: Uuid,
    logger: RunLogger,
    cancel: CancelToken,
}

impl NetworkPropagation {
    pub fn new(config: PropagationConfig) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
            logger: RunLogger::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Token that aborts kernel construction when cancelled
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Run with the configured seed, or an entropy-seeded RNG
    pub fn run(&self) -> Result<RunOutcome, PropagationError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(&mut rng)
    }

    /// Run with an explicit RNG, under this run's logger
    pub fn run_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<RunOutcome, PropagationError> {
        // A rejected configuration must not leave a log file behind
        self.config.validate()?;

        self.logger
            .scoped(self.run_id, || {
                let result = self.execute(rng);
                if let Err(e) = &result {
                    error!("Propagation failed: {}", e);
                }
                result
            })
            .and_then(|outcome| outcome)
    }

    fn execute<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<RunOutcome, PropagationError> {
        let started_at = Utc::now();
        let config = &self.config;

        // 1. Parameters and output path, before any input is touched
        config.validate()?;
        let writer = ResultWriter::new(OutputPaths::new(&config.output_path, &config.output_extension)?);

        info!(
            "Starting network propagation: {} null model, {} random runs, {:?} kernel",
            config.null_model.as_str(),
            config.random_runs,
            config.kernel
        );

        let mut manifest = RunManifest::new(self.run_id, started_at, config.clone());

        // 2. Interaction graph, restricted to its giant component
        let graph = load_graph(&config.graph_path, InputKind::Graph)?;
        manifest.inputs.push(fingerprint(&config.graph_path, InputKind::Graph)?);
        info!("Loaded graph: {} nodes, {} edges", graph.node_count(), graph.edge_count());

        let mut giant = graph.giant_component();
        giant.normalize_weights();
        info!(
            "Giant component: {} nodes, {} edges",
            giant.node_count(),
            giant.edge_count()
        );
        manifest.graph = graph.summary();
        manifest.giant_component = giant.summary();
        drop(graph);

        // 3. Patient table
        let patients = PatientTable::from_path(&config.patient_path).map_err(|source| {
            PropagationError::PatientTable {
                path: config.patient_path.clone(),
                source,
            }
        })?;
        manifest
            .inputs
            .push(fingerprint(&config.patient_path, InputKind::PatientTable)?);
        info!(
            "Loaded patient table: {} patients, {} nodes",
            patients.patient_count(),
            patients.row_ids().len()
        );
        if patients.duplicate_rows() > 0 {
            warn!(
                "{} duplicate node rows in patient table, keeping per-patient maximum",
                patients.duplicate_rows()
            );
        }

        let overlap = patients.overlap(&giant);
        if overlap == 0 {
            return Err(PropagationError::NoOverlap {
                input: InputKind::PatientTable,
                details: format!(
                    "none of its {} node identifiers appear in the {}-node giant component",
                    patients.row_ids().len(),
                    giant.node_count()
                ),
            });
        }
        info!("{} patient table nodes found in the giant component", overlap);

        // 4. Regulator network, checked before kernel work
        let alpha_model = AlphaModel::default();
        let alpha = alpha_model.alpha(giant.edge_count() as f64)?;

        let projection = match &config.regulator_path {
            Some(path) => {
                let mut regulators = load_graph(path, InputKind::RegulatorGraph)?;
                manifest.inputs.push(fingerprint(path, InputKind::RegulatorGraph)?);
                info!(
                    "Loaded regulator network: {} nodes, {} edges",
                    regulators.node_count(),
                    regulators.edge_count()
                );
                regulators.normalize_weights();
                let projection = RegulatoryProjection::new(&regulators, &giant, alpha)?;
                manifest.regulatory = Some(projection.summary());
                Some(projection)
            }
            None => None,
        };

        // 5. Kernel
        let mut cancel = self.cancel.clone();
        if let Some(timeout) = config.kernel_timeout {
            cancel = cancel.with_deadline(timeout);
        }
        let kernel = KernelBuilder::new(config.kernel)
            .with_alpha_model(alpha_model)
            .with_cancel_token(cancel)
            .build(&giant)?;
        manifest.alpha = kernel.alpha();

        let pool = match config.threads {
            Some(threads) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| {
                        PropagationError::InvalidParameter(format!("thread pool: {}", e))
                    })?,
            )),
            None => None,
        };

        // 6. Real propagation of every patient
        let vectors: Vec<PatientVector> = (0..patients.patient_count())
            .map(|col| patients.initial_vector(col, &giant))
            .collect();
        let propagate_all = || -> Vec<DVector<f64>> {
            vectors
                .par_iter()
                .map(|vector| kernel.propagate(&vector.values))
                .collect()
        };
        let propagated = match &pool {
            Some(pool) => pool.install(propagate_all),
            None => propagate_all(),
        };

        // 7. Null models and scores
        let strategy = NullModelStrategy::new(config.null_model, &giant, config.sortwide);
        if let NullModelStrategy::DegreePreserving(degrees) = &strategy {
            info!("Degree-preserving null model, rank window ±{}", degrees.window());
        }
        let mut sampler = NullModelSampler::new(strategy, &kernel, config.random_runs);
        if let Some(pool) = &pool {
            sampler = sampler.with_thread_pool(Arc::clone(pool));
        }

        for vector in &vectors {
            info!(
                "Patient {}: {} source nodes in the graph",
                vector.patient,
                vector.source_count()
            );
            manifest.patients.push(PatientSummary {
                patient: vector.patient.clone(),
                source_nodes: vector.source_count(),
            });
        }

        let source_sets: Vec<&[usize]> = vectors.iter().map(|v| v.sources.as_slice()).collect();
        let groups = sampler.strategy().group(&source_sets);

        let mut gene_scores: Vec<Option<PatientScores>> = vectors.iter().map(|_| None).collect();
        let mut target_scores: Vec<Option<PatientScores>> = vectors.iter().map(|_| None).collect();

        // One ensemble alive at a time, dropped once its group is scored
        for group in &groups {
            let null = sampler.ensemble(source_sets[group.patients[0]], rng);
            let target_null = projection.as_ref().map(|p| p.project_ensemble(&null));

            for &col in &group.patients {
                let vector = &vectors[col];
                let real = &propagated[col];
                gene_scores[col] = Some(PatientScores {
                    patient: vector.patient.clone(),
                    source_count: vector.source_count(),
                    scores: score_nodes(real, &null),
                });

                if let (Some(projection), Some(target_null)) = (&projection, &target_null) {
                    target_scores[col] = Some(PatientScores {
                        patient: vector.patient.clone(),
                        source_count: vector.source_count(),
                        scores: score_nodes(&projection.project(real), target_null),
                    });
                }
            }
        }

        let node_ids: Vec<String> = giant.node_ids().map(str::to_string).collect();
        let mut genes = StageScores::new(node_ids);
        genes.patients = gene_scores.into_iter().flatten().collect();
        let targets = projection.as_ref().map(|p| {
            let mut targets = StageScores::new(p.targets().to_vec());
            targets.patients = target_scores.into_iter().flatten().collect();
            targets
        });

        manifest.null_ensembles = groups.len();
        info!(
            "Scored {} patients against {} null ensembles",
            genes.patients.len(),
            groups.len()
        );

        // 8. Outputs, only once everything above succeeded
        let outputs = writer.write(&genes, targets.as_ref(), &mut manifest)?;
        info!("Network propagation finished: {} files written", outputs.len());

        Ok(RunOutcome {
            run_id: self.run_id,
            alpha: kernel.alpha(),
            genes,
            targets,
            outputs,
            manifest,
        })
    }
}

/// Load an edge list and reject one without edges
fn load_graph(path: &Path, input: InputKind) -> Result<InteractionGraph, PropagationError> {
    let graph = InteractionGraph::from_path(path).map_err(|source| PropagationError::EdgeList {
        input,
        path: path.to_path_buf(),
        source,
    })?;

    if graph.edge_count() == 0 {
        return Err(PropagationError::EmptyGraph { input });
    }
    Ok(graph)
}

fn fingerprint(path: &Path, kind: InputKind) -> Result<InputFingerprint, PropagationError> {
    let sha256 = input::sha256_file(path).map_err(|source| PropagationError::InputIo {
        input: kind,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(InputFingerprint {
        kind,
        path: path.to_path_buf(),
        sha256,
    })
}
