// ==============================================================================
// parsers/mod.rs - Table parser modules
// ==============================================================================
// Description: Readers and writers for catalog, cross-validation and clade tables
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod catalog;
pub mod clade;
pub mod cross_validation;

pub use catalog::{load_catalog, write_catalog};
pub use clade::{load_clade_thresholds, CladeThreshold};
pub use cross_validation::{load_table, locate, write_table, CrossValidationPaths};
