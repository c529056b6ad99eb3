// ==============================================================================
// output.rs - Result Tables and Run Manifest
// ==============================================================================
// Description: Tab-separated score tables and the JSON run manifest
// Author: Matt Barham
// Created: 2026-09-23
// Modified: 2026-10-14
// Version: 1.1.0
// ==============================================================================
// Files written for an output path `<stem>.<ext>`:
//   <stem>.<ext>          combined records (one row per patient and node)
//   <stem>_Z.<ext>        Z-scores, nodes x patients
//   <stem>_rv.<ext>       propagated real values, nodes x patients
//   <stem>TF_TG.<ext>     combined records of regulated targets
//   <stem>_Z_TF.<ext>     target Z-scores
//   <stem>_rv_TF.<ext>    target real values
//   <stem>_run.json       run manifest
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::config::{output_stem, PropagationConfig};
use crate::error::{InputKind, PropagationError};
use crate::graph::GraphSummary;
use crate::regulatory::RegulatorySummary;
use crate::scoring::{NodeScore, StageScores};

/// Index label of every node-keyed table
pub const INDEX_LABEL: &str = "GeneID";

/// Tables produced by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTable {
    Combined,
    ZScores,
    RealValues,
    TargetCombined,
    TargetZScores,
    TargetRealValues,
    Manifest,
}

impl OutputTable {
    /// Suffix appended to the output stem
    pub fn suffix(&self) -> &'static str {
        match self {
            OutputTable::Combined => "",
            OutputTable::ZScores => "_Z",
            OutputTable::RealValues => "_rv",
            OutputTable::TargetCombined => "TF_TG",
            OutputTable::TargetZScores => "_Z_TF",
            OutputTable::TargetRealValues => "_rv_TF",
            OutputTable::Manifest => "_run",
        }
    }

    /// Only written when a regulator network was given
    pub fn is_stage_two(&self) -> bool {
        matches!(
            self,
            OutputTable::TargetCombined | OutputTable::TargetZScores | OutputTable::TargetRealValues
        )
    }
}

/// Output file names derived from the configured output path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    stem: String,
    extension: String,
}

impl OutputPaths {
    pub fn new(output_path: &Path, extension: &str) -> Result<Self, PropagationError> {
        let stem = output_stem(output_path, extension)?;
        Ok(Self {
            stem,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn path(&self, table: OutputTable) -> PathBuf {
        let extension = match table {
            OutputTable::Manifest => "json",
            _ => self.extension.as_str(),
        };
        PathBuf::from(format!("{}{}.{}", self.stem, table.suffix(), extension))
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }
}

/// One row of a combined record table
#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    #[serde(rename = "GeneID")]
    gene_id: &'a str,
    patient: &'a str,
    source_node_in_the_graph: usize,
    real_value: f64,
    #[serde(rename = "Z")]
    z: f64,
    mean: f64,
    std: f64,
}

/// Source-node count of one patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientSummary {
    pub patient: String,
    pub source_nodes: usize,
}

/// SHA-256 of an input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFingerprint {
    pub kind: InputKind,
    pub path: PathBuf,
    pub sha256: String,
}

/// Provenance of a run, written next to the result tables
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config: PropagationConfig,
    pub alpha: f64,
    pub graph: GraphSummary,
    pub giant_component: GraphSummary,
    pub patients: Vec<PatientSummary>,
    /// Distinct null ensembles drawn
    pub null_ensembles: usize,
    pub regulatory: Option<RegulatorySummary>,
    pub inputs: Vec<InputFingerprint>,
    pub outputs: Vec<PathBuf>,
}

impl RunManifest {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, config: PropagationConfig) -> Self {
        Self {
            run_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: None,
            config,
            alpha: 0.0,
            graph: GraphSummary { nodes: 0, edges: 0 },
            giant_component: GraphSummary { nodes: 0, edges: 0 },
            patients: Vec::new(),
            null_ensembles: 0,
            regulatory: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// Writes the tables of a finished run
pub struct ResultWriter {
    paths: OutputPaths,
}

impl ResultWriter {
    pub fn new(paths: OutputPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Write every table, then the manifest.
    ///
    /// # Arguments
    /// * `genes` - stage-one scores over the giant component
    /// * `targets` - stage-two scores, when a regulator network was given
    /// * `manifest` - completed with the output list and finish time
    ///
    /// # Returns
    /// * Paths of all written files, manifest last
    pub fn write(
        &self,
        genes: &StageScores,
        targets: Option<&StageScores>,
        manifest: &mut RunManifest,
    ) -> Result<Vec<PathBuf>, PropagationError> {
        let combined = self.paths.path(OutputTable::Combined);
        if let Some(parent) = combined.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PropagationError::OutputIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut written = Vec::new();

        written.push(self.write_records(OutputTable::Combined, genes)?);
        written.push(self.write_matrix(OutputTable::ZScores, genes, |s| s.z)?);
        written.push(self.write_matrix(OutputTable::RealValues, genes, |s| s.real_value)?);

        if let Some(targets) = targets {
            written.push(self.write_records(OutputTable::TargetCombined, targets)?);
            written.push(self.write_matrix(OutputTable::TargetZScores, targets, |s| s.z)?);
            written.push(self.write_matrix(OutputTable::TargetRealValues, targets, |s| {
                s.real_value
            })?);
        }

        let manifest_path = self.paths.path(OutputTable::Manifest);
        manifest.outputs = written.clone();
        manifest.outputs.push(manifest_path.clone());
        manifest.finished_at = Some(Utc::now());
        write_manifest(&manifest_path, manifest)?;
        written.push(manifest_path);

        for path in &written {
            info!("Wrote {:?}", path);
        }
        Ok(written)
    }

    /// Long-format table: one row per (patient, node)
    fn write_records(
        &self,
        table: OutputTable,
        stage: &StageScores,
    ) -> Result<PathBuf, PropagationError> {
        let path = self.paths.path(table);
        let table_error = |source| PropagationError::OutputTable {
            path: path.clone(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .map_err(table_error)?;

        let mut rows = 0;
        for patient in &stage.patients {
            for (gene_id, score) in stage.node_ids.iter().zip(&patient.scores) {
                rows += 1;
                writer
                    .serialize(RecordRow {
                        gene_id,
                        patient: &patient.patient,
                        source_node_in_the_graph: patient.source_count,
                        real_value: score.real_value,
                        z: score.z,
                        mean: score.mean,
                        std: score.std,
                    })
                    .map_err(table_error)?;
            }
        }

        // Header still written when there are no rows
        if rows == 0 {
            writer
                .write_record([
                    INDEX_LABEL,
                    "patient",
                    "source_node_in_the_graph",
                    "real_value",
                    "Z",
                    "mean",
                    "std",
                ])
                .map_err(table_error)?;
        }

        writer.flush().map_err(|source| PropagationError::OutputIo {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Wide table: one row per node, one column per patient
    fn write_matrix<F>(
        &self,
        table: OutputTable,
        stage: &StageScores,
        value: F,
    ) -> Result<PathBuf, PropagationError>
    where
        F: Fn(&NodeScore) -> f64,
    {
        let path = self.paths.path(table);
        let table_error = |source| PropagationError::OutputTable {
            path: path.clone(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .map_err(table_error)?;

        let mut header = vec![INDEX_LABEL.to_string()];
        header.extend(stage.patients.iter().map(|p| p.patient.clone()));
        writer.write_record(&header).map_err(table_error)?;

        for (node, gene_id) in stage.node_ids.iter().enumerate() {
            let mut row = Vec::with_capacity(stage.patients.len() + 1);
            row.push(gene_id.clone());
            for patient in &stage.patients {
                row.push(value(&patient.scores[node]).to_string());
            }
            writer.write_record(&row).map_err(table_error)?;
        }

        writer.flush().map_err(|source| PropagationError::OutputIo {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<(), PropagationError> {
    let io_error = |source| PropagationError::OutputIo {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(io_error)?;
    serde_json::to_writer_pretty(&mut file, manifest)?;
    file.write_all(b"\n").map_err(io_error)?;
    Ok(())
}
