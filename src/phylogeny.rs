// ==============================================================================
// phylogeny.rs - Consensus Download and Comparison Build
// ==============================================================================
// Description: Builds the multi-FASTA, SNP site alignment, SNP matrix and tree
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Outputs:
//   <workdir>/multi_fasta.fas   concatenated consensus sequences
//   <workdir>/snps.fas          variable sites only (snp-sites -c)
//   <results>/snp_matrix.tab    pairwise SNP distances (snp-dists)
//   <results>/mega.*            maximum parsimony tree (megacc), optional
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ResultsLayout;
use crate::error::{PipelineError, Result};
use crate::location::ResultLocation;
use crate::metadata::StageMetadata;
use crate::models::RecordSet;
use crate::storage::ObjectStore;
use crate::warnings::{Warning, WarningSink};
use crate::workdir::WorkDir;

pub const MULTI_FASTA_FILE: &str = "multi_fasta.fas";
pub const SNP_SITES_FILE: &str = "snps.fas";
pub const SNP_MATRIX_FILE: &str = "snp_matrix.tab";
pub const TREE_PREFIX: &str = "mega";

/// Parsimony trees need at least four taxa
pub const MIN_TREE_TAXA: usize = 4;

/// External comparison binaries
#[allow(async_fn_in_trait)]
pub trait ComparisonTools {
    /// Extract variable sites from `multi_fasta` into `output`
    async fn snp_sites(&self, multi_fasta: &Path, output: &Path) -> Result<()>;

    /// Pairwise SNP distance matrix of `snps` into `output`
    async fn snp_dists(&self, snps: &Path, output: &Path, threads: usize) -> Result<()>;

    /// Build a tree from `snps`; artifacts are named `<output_prefix>.*`
    async fn build_tree(&self, snps: &Path, output_prefix: &Path) -> Result<()>;
}

/// Runs `snp-sites`, `snp-dists` and `megacc` as child processes
#[derive(Debug, Clone)]
pub struct CommandLineTools {
    pub snp_sites: PathBuf,
    pub snp_dists: PathBuf,
    pub megacc: PathBuf,
    /// MEGA analysis options file passed to `megacc -a`
    pub mao_file: PathBuf,
}

impl Default for CommandLineTools {
    fn default() -> Self {
        Self {
            snp_sites: PathBuf::from("snp-sites"),
            snp_dists: PathBuf::from("snp-dists"),
            megacc: PathBuf::from("megacc"),
            mao_file: PathBuf::from("infer_MP.mao"),
        }
    }
}

impl CommandLineTools {
    async fn run(&self, tool: &str, command: &mut Command) -> Result<Output> {
        debug!("Running {:?}", command);
        let output = command.output().await.map_err(|e| PipelineError::ExternalTool {
            tool: tool.to_string(),
            reason: format!("could not start: {}", e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::ExternalTool {
                tool: tool.to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(output)
    }
}

impl ComparisonTools for CommandLineTools {
    async fn snp_sites(&self, multi_fasta: &Path, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.snp_sites);
        command.arg(multi_fasta).arg("-c").arg("-o").arg(output);
        self.run("snp-sites", &mut command).await?;
        require_output("snp-sites", output)
    }

    async fn snp_dists(&self, snps: &Path, output: &Path, threads: usize) -> Result<()> {
        let mut command = Command::new(&self.snp_dists);
        command.arg("-j").arg(threads.max(1).to_string()).arg(snps);
        let result = self.run("snp-dists", &mut command).await?;

        // snp-dists only writes to stdout
        tokio::fs::write(output, &result.stdout).await?;
        require_output("snp-dists", output)
    }

    async fn build_tree(&self, snps: &Path, output_prefix: &Path) -> Result<()> {
        let mut command = Command::new(&self.megacc);
        command
            .arg("-a")
            .arg(&self.mao_file)
            .arg("-d")
            .arg(snps)
            .arg("-o")
            .arg(output_prefix);
        self.run("megacc", &mut command).await?;

        if tree_artifacts(output_prefix)?.is_empty() {
            return Err(PipelineError::ExternalTool {
                tool: "megacc".to_string(),
                reason: format!("no output written with prefix {:?}", output_prefix),
            });
        }
        Ok(())
    }
}

fn require_output(tool: &str, path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(PipelineError::ExternalTool {
            tool: tool.to_string(),
            reason: format!("missing or empty output {:?}", path),
        }),
    }
}

/// Files in the prefix's directory whose names start with the prefix
pub fn tree_artifacts(output_prefix: &Path) -> Result<Vec<PathBuf>> {
    let (Some(dir), Some(stem)) = (output_prefix.parent(), output_prefix.file_name()) else {
        return Ok(Vec::new());
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let stem = stem.to_string_lossy();
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(stem.as_ref()) {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// Build stage settings
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub threads: usize,
    pub build_tree: bool,
    pub download_only: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            build_tree: false,
            download_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub number_of_sequences: usize,
    pub number_of_snps: Option<usize>,
    pub tree_built: bool,
    pub download_only: bool,
}

impl StageMetadata for BuildMetadata {
    const STAGE: &'static str = "build";
}

/// File name of a sample's cached consensus sequence. Sample names must stay
/// inside the cache directory, so only ASCII alphanumerics and `_ . -` are
/// accepted and `.`/`..` are rejected.
fn cache_file_name(sample: &str) -> Result<String> {
    let safe = !sample.is_empty()
        && sample != "."
        && sample != ".."
        && sample
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !safe {
        return Err(PipelineError::Configuration(format!(
            "sample name '{}' cannot be used as a consensus cache file name",
            sample.escape_default()
        )));
    }
    Ok(format!("{}.fas", sample))
}

/// Fetch every sample's consensus sequence (reusing cached copies in
/// `consensus_dir`) and concatenate them into `output`.
///
/// All result locations are parsed before anything is downloaded. Returns
/// the number of sequences written.
pub async fn build_multi_fasta<S: ObjectStore>(
    store: &S,
    records: &RecordSet,
    consensus_dir: &Path,
    output: &Path,
) -> Result<usize> {
    let mut sources = Vec::with_capacity(records.len());
    for record in records {
        let location = ResultLocation::parse(&record.result_loc)?;
        let cache_name = cache_file_name(&record.sample)?;
        sources.push((cache_name, location.consensus_key(&record.sample)));
    }

    tokio::fs::create_dir_all(consensus_dir).await?;
    let mut out = tokio::fs::File::create(output).await?;

    let mut fetched = 0usize;
    for (cache_name, object) in &sources {
        let cached = consensus_dir.join(cache_name);
        if !cached.is_file() {
            store.fetch(object, &cached).await?;
            fetched += 1;
        }

        let mut sequence = tokio::fs::read(&cached).await?;
        if sequence.last().is_some_and(|b| *b != b'\n') {
            sequence.push(b'\n');
        }
        out.write_all(&sequence).await?;
    }
    out.flush().await?;

    info!(
        "Wrote {} consensus sequences to {:?} ({} downloaded, {} cached)",
        sources.len(),
        output,
        fetched,
        sources.len() - fetched
    );
    Ok(sources.len())
}

/// Number of FASTA headers in a file
pub fn count_sequences(path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().filter(|l| l.starts_with('>')).count())
}

/// Length of the first sequence in a FASTA file
pub fn count_snps(path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)?;
    let length = contents
        .lines()
        .skip_while(|l| !l.starts_with('>'))
        .skip(1)
        .take_while(|l| !l.starts_with('>'))
        .map(|l| l.trim().len())
        .sum();
    Ok(length)
}

/// Run the build stage.
///
/// `multi_fasta.fas` and `snps.fas` go to `workdir`; the SNP matrix and tree
/// always go to the results directory.
#[allow(clippy::too_many_arguments)]
pub async fn build<S: ObjectStore, T: ComparisonTools>(
    store: &S,
    tools: &T,
    records: &RecordSet,
    consensus_dir: &Path,
    workdir: &WorkDir,
    layout: &ResultsLayout,
    options: &BuildOptions,
    warnings: &mut WarningSink,
) -> Result<BuildMetadata> {
    tokio::fs::create_dir_all(layout.root()).await?;

    let multi_fasta = workdir.path().join(MULTI_FASTA_FILE);
    let number_of_sequences = build_multi_fasta(store, records, consensus_dir, &multi_fasta).await?;

    if options.download_only {
        info!("Download only: skipping comparison tools");
        return Ok(BuildMetadata {
            number_of_sequences,
            number_of_snps: None,
            tree_built: false,
            download_only: true,
        });
    }

    let snps = workdir.path().join(SNP_SITES_FILE);
    info!("Extracting SNP sites");
    tools.snp_sites(&multi_fasta, &snps).await?;
    let number_of_snps = count_snps(&snps)?;
    info!("{} SNP sites found", number_of_snps);

    info!("Computing SNP matrix with {} thread(s)", options.threads);
    tools
        .snp_dists(&snps, &layout.snp_matrix(), options.threads)
        .await?;

    let mut tree_built = false;
    if options.build_tree {
        let taxa = count_sequences(&snps)?;
        if taxa < MIN_TREE_TAXA {
            warnings.emit(Warning::TooFewTaxa {
                found: taxa,
                required: MIN_TREE_TAXA,
            });
        } else {
            info!("Building tree from {} sequences", taxa);
            tools.build_tree(&snps, &layout.tree_prefix()).await?;
            tree_built = true;
        }
    }

    Ok(BuildMetadata {
        number_of_sequences,
        number_of_snps: Some(number_of_snps),
        tree_built,
        download_only: false,
    })
}


#[cfg(test)]
mod tests {
    use super::fakes::{put_consensus, FakeTools};
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::fixtures::{record, record_set};
    use crate::storage::LocalObjectStore;
    use crate::warnings::WarningStyle;

    const LOC: &str = "s3://s3-csu-003/v3/Results_10032_18Jul22";

    fn store_with(samples: &[&str]) -> (tempfile::TempDir, LocalObjectStore) {
        let root = tempfile::tempdir().unwrap();
        for sample in samples {
            put_consensus(root.path(), LOC, sample, "ACGTACGT");
        }
        let store = LocalObjectStore::new(root.path());
        (root, store)
    }

    #[tokio::test]
    async fn test_multi_fasta_uses_cache() {
        let (_root, store) = store_with(&["AF-1"]);
        let dir = tempfile::tempdir().unwrap();
        let consensus = dir.path().join("consensus");
        std::fs::create_dir_all(&consensus).unwrap();
        // AF-2 is only available from the cache, without a trailing newline
        std::fs::write(consensus.join("AF-2.fas"), ">AF-2\nTTTT").unwrap();

        let records = record_set(vec![record("AF-1", "1", 99.0), record("AF-2", "2", 99.0)]);
        let out = dir.path().join(MULTI_FASTA_FILE);
        let n = build_multi_fasta(&store, &records, &consensus, &out).await.unwrap();

        assert_eq!(n, 2);
        assert!(consensus.join("AF-1.fas").is_file());
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            ">AF-1\nACGTACGT\n>AF-2\nTTTT\n"
        );
    }

    #[tokio::test]
    async fn test_malformed_location_before_download() {
        let (_root, store) = store_with(&["AF-1"]);
        let dir = tempfile::tempdir().unwrap();
        let mut bad = record("AF-2", "2", 99.0);
        bad.result_loc = "s3://s3-csu-03/v3/r1".to_string();
        let records = record_set(vec![record("AF-1", "1", 99.0), bad]);

        let err = build_multi_fasta(&store, &records, &dir.path().join("c"), &dir.path().join("m.fas"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedLocation);
        assert!(!dir.path().join("c").join("AF-1.fas").exists());
    }

    #[tokio::test]
    async fn test_unsafe_sample_name_stays_out_of_cache() {
        let (_root, store) = store_with(&["AF-1"]);
        let dir = tempfile::tempdir().unwrap();
        let consensus = dir.path().join("cache").join("consensus");

        for name in ["../evil", "a/b", "..", "", "a\\b", "nul\0"] {
            let records = record_set(vec![record("AF-1", "1", 99.0), record(name, "2", 99.0)]);
            let err = build_multi_fasta(&store, &records, &consensus, &dir.path().join("m.fas"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{:?}", name);
        }
        assert!(!consensus.exists());
        assert!(!dir.path().join("cache").join("evil.fas").exists());
        assert_eq!(cache_file_name("AF-61-03769-21").unwrap(), "AF-61-03769-21.fas");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_root, store) = store_with(&[]);
        let dir = tempfile::tempdir().unwrap();
        let records = record_set(vec![record("AF-1", "1", 99.0)]);
        let err = build_multi_fasta(&store, &records, &dir.path().join("c"), &dir.path().join("m.fas"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }

    #[test]
    fn test_fasta_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNP_SITES_FILE);
        std::fs::write(&path, ">A\nACG\nTA\n>B\nACGTT\n>C\nAAAAA\n").unwrap();
        assert_eq!(count_sequences(&path).unwrap(), 3);
        assert_eq!(count_snps(&path).unwrap(), 5);

        std::fs::write(&path, "").unwrap();
        assert_eq!(count_sequences(&path).unwrap(), 0);
        assert_eq!(count_snps(&path).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_build_skips_tree_with_too_few_taxa() {
        let samples = ["AF-1", "AF-2", "AF-3"];
        let (_root, store) = store_with(&samples);
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let workdir = WorkDir::for_mode(false, &results, None).unwrap();
        let records = record_set(
            samples
                .iter()
                .enumerate()
                .map(|(i, s)| record(s, &i.to_string(), 99.0))
                .collect(),
        );
        let tools = FakeTools::default();
        let mut warnings = WarningSink::new(WarningStyle::Short);
        let options = BuildOptions {
            build_tree: true,
            ..BuildOptions::default()
        };

        let meta = build(
            &store,
            &tools,
            &records,
            &dir.path().join("consensus"),
            &workdir,
            &ResultsLayout::new(&results),
            &options,
            &mut warnings,
        )
        .await
        .unwrap();

        assert_eq!(meta.number_of_sequences, 3);
        assert_eq!(meta.number_of_snps, Some(8));
        assert!(!meta.tree_built);
        assert_eq!(tools.calls(), vec!["snp-sites", "snp-dists"]);
        assert_eq!(
            warnings.issued(),
            &[Warning::TooFewTaxa { found: 3, required: 4 }]
        );
        assert!(results.join(SNP_MATRIX_FILE).is_file());
        assert!(results.join(MULTI_FASTA_FILE).is_file());
    }

    #[tokio::test]
    async fn test_build_tree_and_download_only() {
        let samples = ["AF-1", "AF-2", "AF-3", "AF-4"];
        let (_root, store) = store_with(&samples);
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let workdir = WorkDir::for_mode(false, &results, None).unwrap();
        let records = record_set(
            samples
                .iter()
                .enumerate()
                .map(|(i, s)| record(s, &i.to_string(), 99.0))
                .collect(),
        );
        let consensus = dir.path().join("consensus");
        let layout = ResultsLayout::new(&results);
        let mut warnings = WarningSink::new(WarningStyle::Short);

        let tools = FakeTools::default();
        let options = BuildOptions {
            build_tree: true,
            ..BuildOptions::default()
        };
        let meta = build(&store, &tools, &records, &consensus, &workdir, &layout, &options, &mut warnings)
            .await
            .unwrap();
        assert!(meta.tree_built);
        assert_eq!(tree_artifacts(&layout.tree_prefix()).unwrap().len(), 1);

        let tools = FakeTools::default();
        let options = BuildOptions {
            download_only: true,
            ..BuildOptions::default()
        };
        let meta = build(&store, &tools, &records, &consensus, &workdir, &layout, &options, &mut warnings)
            .await
            .unwrap();
        assert!(meta.download_only);
        assert_eq!(meta.number_of_snps, None);
        assert!(tools.calls().is_empty());
        assert!(warnings.issued().is_empty());
    }

    #[tokio::test]
    async fn test_command_line_tool_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join(MULTI_FASTA_FILE);
        std::fs::write(&input, ">A\nACGT\n").unwrap();

        let tools = CommandLineTools {
            snp_sites: PathBuf::from("/nonexistent/snp-sites"),
            snp_dists: PathBuf::from("false"),
            ..CommandLineTools::default()
        };

        let err = tools.snp_sites(&input, &dir.path().join("snps.fas")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);

        let err = tools
            .snp_dists(&input, &dir.path().join(SNP_MATRIX_FILE), 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(err.to_string().contains("snp-dists"));
    }
}
