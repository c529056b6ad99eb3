// ==============================================================================
// error.rs - Propagation Error Taxonomy
// ==============================================================================
// Description: Error types for graph loading, kernel construction and scoring
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-10-02
// Version: 1.1.0
// ==============================================================================

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::graph::EdgeListError;
use crate::patients::PatientTableError;

/// The input a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Graph,
    PatientTable,
    RegulatorGraph,
    OutputPath,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Graph => "interaction graph",
            InputKind::PatientTable => "patient table",
            InputKind::RegulatorGraph => "regulator-target graph",
            InputKind::OutputPath => "output path",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a propagation run
#[derive(Error, Debug)]
pub enum PropagationError {
    // ---- configuration -------------------------------------------------------
    #[error("Invalid output path {path:?}: file name must end in '.{extension}'")]
    InvalidOutputPath { path: PathBuf, extension: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Alpha {alpha} derived from {edges} edges is outside (0, 1): network edge count is too high for this kernel")]
    InvalidAlpha { alpha: f64, edges: f64 },

    // ---- data mismatch -------------------------------------------------------
    #[error("The {input} contains no edges")]
    EmptyGraph { input: InputKind },

    #[error("The {input} shares no identifiers with the giant component: {details}")]
    NoOverlap { input: InputKind, details: String },

    // ---- input parsing -------------------------------------------------------
    #[error("Failed to load {input} from {path:?}: {source}")]
    EdgeList {
        input: InputKind,
        path: PathBuf,
        #[source]
        source: EdgeListError,
    },

    #[error("Failed to load patient table from {path:?}: {source}")]
    PatientTable {
        path: PathBuf,
        #[source]
        source: PatientTableError,
    },

    // ---- numerical -----------------------------------------------------------
    #[error("Kernel matrix (I - {alpha}*A) is singular and cannot be inverted")]
    SingularKernel { alpha: f64 },

    #[error("Kernel matrix contains non-finite entries (alpha = {alpha})")]
    NonFiniteKernel { alpha: f64 },

    #[error("Kernel construction cancelled")]
    KernelCancelled,

    #[error("Kernel inversion worker terminated unexpectedly")]
    KernelWorkerFailed,

    #[error("Kernel construction exceeded its deadline after {elapsed_secs:.1}s")]
    KernelDeadlineExceeded { elapsed_secs: f64 },

    // ---- output --------------------------------------------------------------
    #[error("Failed to write {path:?}: {source}")]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write table {path:?}: {source}")]
    OutputTable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to serialize run manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Failed to read {input} {path:?}: {source}")]
    InputIo {
        input: InputKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PropagationError {
    /// Bad parameters or output path; nothing was computed
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PropagationError::InvalidOutputPath { .. }
                | PropagationError::InvalidParameter(_)
                | PropagationError::InvalidAlpha { .. }
        )
    }

    /// Inputs that do not line up with each other
    pub fn is_data_mismatch(&self) -> bool {
        matches!(
            self,
            PropagationError::EmptyGraph { .. } | PropagationError::NoOverlap { .. }
        )
    }

    /// The input the failure is attributed to, when there is one
    pub fn input(&self) -> Option<InputKind> {
        match self {
            PropagationError::InvalidOutputPath { .. } => Some(InputKind::OutputPath),
            PropagationError::InvalidAlpha { .. } => Some(InputKind::Graph),
            PropagationError::EmptyGraph { input }
            | PropagationError::NoOverlap { input, .. }
            | PropagationError::EdgeList { input, .. }
            | PropagationError::InputIo { input, .. } => Some(*input),
            PropagationError::PatientTable { .. } => Some(InputKind::PatientTable),
            PropagationError::OutputIo { .. } | PropagationError::OutputTable { .. } => {
                Some(InputKind::OutputPath)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = PropagationError::InvalidOutputPath {
            path: PathBuf::from("out.tsv"),
            extension: "txt".to_string(),
        };
        assert!(err.is_config());
        assert!(!err.is_data_mismatch());
        assert_eq!(err.input(), Some(InputKind::OutputPath));

        let err = PropagationError::NoOverlap {
            input: InputKind::RegulatorGraph,
            details: "0 shared nodes".to_string(),
        };
        assert!(err.is_data_mismatch());
        assert_eq!(err.input(), Some(InputKind::RegulatorGraph));
    }

    #[test]
    fn test_messages_name_input() {
        let err = PropagationError::NoOverlap {
            input: InputKind::PatientTable,
            details: "check the IDs".to_string(),
        };
        assert!(err.to_string().contains("patient table"));

        let err = PropagationError::EmptyGraph {
            input: InputKind::Graph,
        };
        assert_eq!(err.to_string(), "The interaction graph contains no edges");
    }
}
