// ==============================================================================
// models.rs - Sample Catalog Data Models
// ==============================================================================
// Description: Typed schema, sample records and cross-validation tables
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PipelineError, Result};

/// Declared kind of a catalog column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// String values filtered by membership in a set
    Categorical,
    /// Floating point values filtered by an inclusive range
    Numeric,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Categorical => "categorical",
            ColumnKind::Numeric => "numeric",
        }
    }
}

/// Columns of the sample catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Sample,
    Submission,
    GenomeCov,
    MeanDepth,
    NumRawReads,
    PcMapped,
    Outcome,
    Flag,
    Group,
    Ncount,
    ResultLoc,
}

/// Catalog schema in file order. Consulted by the filter instead of
/// inspecting runtime values.
pub const SCHEMA: [Column; 11] = [
    Column::Sample,
    Column::Submission,
    Column::GenomeCov,
    Column::MeanDepth,
    Column::NumRawReads,
    Column::PcMapped,
    Column::Outcome,
    Column::Flag,
    Column::Group,
    Column::Ncount,
    Column::ResultLoc,
];

impl Column {
    /// Header name as it appears in the catalog CSV
    pub fn name(&self) -> &'static str {
        match self {
            Column::Sample => "Sample",
            Column::Submission => "Submission",
            Column::GenomeCov => "GenomeCov",
            Column::MeanDepth => "MeanDepth",
            Column::NumRawReads => "NumRawReads",
            Column::PcMapped => "pcMapped",
            Column::Outcome => "Outcome",
            Column::Flag => "flag",
            Column::Group => "group",
            Column::Ncount => "Ncount",
            Column::ResultLoc => "ResultLoc",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::GenomeCov
            | Column::MeanDepth
            | Column::NumRawReads
            | Column::PcMapped
            | Column::Ncount => ColumnKind::Numeric,
            _ => ColumnKind::Categorical,
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        SCHEMA.iter().copied().find(|c| c.name() == name)
    }

    /// Comma separated list of every column name, used in error messages
    pub fn valid_names() -> String {
        SCHEMA.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
    }
}

/// One row of the sample catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Unique sample name (e.g., "AF-61-03769-21")
    #[serde(rename = "Sample")]
    pub sample: String,

    /// Submission number shared by re-sequencing attempts
    #[serde(rename = "Submission")]
    pub submission: String,

    /// Percentage of the genome covered
    #[serde(rename = "GenomeCov")]
    pub genome_cov: Option<f64>,

    /// Mean read depth
    #[serde(rename = "MeanDepth")]
    pub mean_depth: Option<f64>,

    /// Raw read count
    #[serde(rename = "NumRawReads")]
    pub num_raw_reads: Option<f64>,

    /// Percentage of reads mapped to the reference
    #[serde(rename = "pcMapped")]
    pub pc_mapped: Option<f64>,

    /// "Pass", "Fail", ...
    #[serde(rename = "Outcome")]
    pub outcome: String,

    #[serde(rename = "flag")]
    pub flag: String,

    /// Clade
    #[serde(rename = "group")]
    pub group: String,

    /// Number of ambiguous bases in the consensus
    #[serde(rename = "Ncount")]
    pub ncount: Option<f64>,

    /// Storage location of the sample's results folder
    #[serde(rename = "ResultLoc")]
    pub result_loc: String,
}

impl SampleRecord {
    /// Value of a categorical column, `None` for numeric columns
    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::Sample => Some(&self.sample),
            Column::Submission => Some(&self.submission),
            Column::Outcome => Some(&self.outcome),
            Column::Flag => Some(&self.flag),
            Column::Group => Some(&self.group),
            Column::ResultLoc => Some(&self.result_loc),
            _ => None,
        }
    }

    /// Value of a numeric column; `None` for blank cells and categorical columns
    pub fn metric(&self, column: Column) -> Option<f64> {
        match column {
            Column::GenomeCov => self.genome_cov,
            Column::MeanDepth => self.mean_depth,
            Column::NumRawReads => self.num_raw_reads,
            Column::PcMapped => self.pc_mapped,
            Column::Ncount => self.ncount,
            _ => None,
        }
    }
}

/// Ordered collection of sample records with unique sample names
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet(pub(crate) Vec<SampleRecord>);

impl RecordSet {
    /// Build a record set, rejecting repeated sample names
    pub fn from_records(records: Vec<SampleRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.sample.as_str()) {
                return Err(PipelineError::Configuration(format!(
                    "sample '{}' appears more than once",
                    record.sample
                )));
            }
        }
        Ok(Self(records))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SampleRecord> {
        self.0.iter()
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.0
    }

    pub fn into_records(self) -> Vec<SampleRecord> {
        self.0
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.0.iter().map(|r| r.sample.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a SampleRecord;
    type IntoIter = std::slice::Iter<'a, SampleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Externally maintained table (cattle or movement data) joined against
/// the sample set by a key column
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTable {
    /// Short label used in logs and metadata ("cattle", "movement")
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Index of the join key column in `headers`
    pub key_index: usize,
}

impl CrossTable {
    pub fn new(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        key_column: &str,
    ) -> Result<Self> {
        let name = name.into();
        let key_index = headers
            .iter()
            .position(|h| h == key_column)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "{} table has no key column '{}' (columns: {})",
                    name,
                    key_column,
                    headers.join(", ")
                ))
            })?;

        Ok(Self {
            name,
            headers,
            rows,
            key_index,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw key values, one per row
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(self.key_index).map(String::as_str).unwrap_or(""))
    }
}
