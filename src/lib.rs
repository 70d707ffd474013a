// ==============================================================================
// lib.rs - btb-phylo Library
// ==============================================================================
// Description: Library interface for sample selection and phylogeny pipeline modules
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod config;
pub mod consistify;
pub mod duplicates;
pub mod error;
pub mod filter;
pub mod location;
pub mod metadata;
pub mod models;
pub mod parsers;
pub mod phylogeny;
pub mod processor;
pub mod storage;
pub mod update;
pub mod validator;
pub mod warnings;
pub mod workdir;

pub use error::{ErrorKind, PipelineError, Result};
pub use processor::{PipelineOrchestrator, RunPlan, RunReport};
