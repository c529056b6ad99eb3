// ==============================================================================
// patients.rs - Patient Incidence Table
// ==============================================================================
// Description: Parser for per-patient affected-node tables and construction of
//              initial propagation vectors
// Author: Matt Barham
// Created: 2026-09-15
// Modified: 2026-10-05
// Version: 1.1.0
// ==============================================================================
// Format: tab-separated, header row of patient identifiers, first column is the
//         node identifier used in the interaction graph
// Example:
//   GeneID    patient_1    patient_2
//   P04637    1            0
//   Q00987    0            0.5
// ==============================================================================

use csv::{ReaderBuilder, Trim};
use nalgebra::DVector;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::graph::InteractionGraph;
use crate::input;

/// Errors that can occur during patient table parsing
#[derive(Error, Debug)]
pub enum PatientTableError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Table parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Header row has no patient columns")]
    NoPatients,

    #[error("Table contains no node rows")]
    EmptyFile,

    #[error("Invalid value '{value}' for patient '{patient}' at line {line}")]
    InvalidValue {
        line: u64,
        patient: String,
        value: String,
    },
}

/// Initial signal of one patient, aligned to the graph's node order
#[derive(Debug, Clone)]
pub struct PatientVector {
    pub patient: String,
    /// `v_p`: source weight at source nodes, 0 elsewhere
    pub values: DVector<f64>,
    /// Dense indices of the source nodes, ascending
    pub sources: Vec<usize>,
}

impl PatientVector {
    /// `source_node_in_the_graph`
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Node × patient table of initial weights.
///
/// Rows sharing a node identifier are merged at load time by taking the
/// per-patient maximum.
#[derive(Debug, Clone)]
pub struct PatientTable {
    patients: Vec<String>,
    row_ids: Vec<String>,
    rows: HashMap<String, Vec<f64>>,
    duplicate_rows: usize,
}

impl PatientTable {
    /// Parse a patient table file (plain or gzip)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PatientTableError> {
        let reader = input::open_text(path.as_ref())?;
        Self::from_reader(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PatientTableError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        // First header cell labels the index column
        let patients: Vec<String> = reader
            .headers()?
            .iter()
            .skip(1)
            .map(|h| h.to_string())
            .collect();

        if patients.is_empty() {
            return Err(PatientTableError::NoPatients);
        }

        let mut row_ids = Vec::new();
        let mut rows: HashMap<String, Vec<f64>> = HashMap::new();
        let mut duplicate_rows = 0;

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let node_id = match record.get(0) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };

            let mut values = Vec::with_capacity(patients.len());
            for (col, cell) in record.iter().skip(1).enumerate() {
                values.push(parse_cell(cell, line, &patients[col])?);
            }

            match rows.get_mut(&node_id) {
                Some(existing) => {
                    duplicate_rows += 1;
                    for (current, value) in existing.iter_mut().zip(values) {
                        *current = current.max(value);
                    }
                }
                None => {
                    row_ids.push(node_id.clone());
                    rows.insert(node_id, values);
                }
            }
        }

        if rows.is_empty() {
            return Err(PatientTableError::EmptyFile);
        }

        Ok(Self {
            patients,
            row_ids,
            rows,
            duplicate_rows,
        })
    }

    pub fn patients(&self) -> &[String] {
        &self.patients
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    /// Unique node identifiers, in order of first appearance
    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    /// Rows that repeated an earlier node identifier
    pub fn duplicate_rows(&self) -> usize {
        self.duplicate_rows
    }

    /// Merged weight of a node for the patient in column `patient`
    pub fn value(&self, node_id: &str, patient: usize) -> Option<f64> {
        self.rows.get(node_id).and_then(|values| values.get(patient).copied())
    }

    /// Number of row identifiers present in the graph
    pub fn overlap(&self, graph: &InteractionGraph) -> usize {
        self.row_ids.iter().filter(|id| graph.contains(id)).count()
    }

    /// Build `v_p` for the patient in column `patient`.
    ///
    /// A node is a source when its merged value is strictly positive.
    pub fn initial_vector(&self, patient: usize, graph: &InteractionGraph) -> PatientVector {
        let n = graph.node_count();
        let mut values = DVector::zeros(n);
        let mut sources = Vec::new();

        for (idx, node_id) in graph.node_ids().enumerate() {
            if let Some(value) = self.value(node_id, patient) {
                if value > 0.0 {
                    values[idx] = value;
                    sources.push(idx);
                }
            }
        }

        PatientVector {
            patient: self.patients[patient].clone(),
            values,
            sources,
        }
    }
}

fn parse_cell(cell: &str, line: u64, patient: &str) -> Result<f64, PatientTableError> {
    // Empty cells carry no signal
    if cell.is_empty() {
        return Ok(0.0);
    }

    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PatientTableError::InvalidValue {
            line,
            patient: patient.to_string(),
            value: cell.to_string(),
        }),
    }
}
