// ==============================================================================
// lib.rs - Network Propagator Library
// ==============================================================================
// Description: Library interface for network propagation and significance scoring
// Author: Matt Barham
// Created: 2026-09-14
// Modified: 2026-10-14
// Version: 1.2.0
// ==============================================================================

pub mod config;
pub mod error;
pub mod graph;
pub mod input;
pub mod kernel;
pub mod logging;
pub mod null_model;
pub mod output;
pub mod patients;
pub mod pipeline;
pub mod propagator;
pub mod regulatory;
pub mod scoring;

pub use config::{KernelStrategy, NullModelKind, PropagationConfig};
pub use error::{InputKind, PropagationError};
pub use logging::RunLogger;
pub use pipeline::{NetworkPropagation, RunOutcome};
