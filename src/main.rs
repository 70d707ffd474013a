// ==============================================================================
// main.rs - btb-phylo Entry Point
// ==============================================================================
// Description: Command line interface for sample selection and phylogeny runs
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use btb_phylo::config::{FilterSource, PipelineConfig, StageInput};
use btb_phylo::filter::FilterSpec;
use btb_phylo::phylogeny::{BuildOptions, CommandLineTools};
use btb_phylo::storage::LocalObjectStore;
use btb_phylo::warnings::WarningStyle;
use btb_phylo::{PipelineOrchestrator, RunPlan};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sample catalog (all known samples)
    #[arg(long, env = "BTB_SUMMARY_FILEPATH", default_value = "btb_wgs_samples.csv", global = true)]
    summary_filepath: PathBuf,

    /// Local root of the object store (<root>/<bucket>/<key>)
    #[arg(long, env = "BTB_OBJECT_STORE_ROOT", default_value = "/mnt/object-store", global = true)]
    object_store_root: PathBuf,

    /// How warnings are printed
    #[arg(long, value_enum, default_value_t = WarningFormat::Short, global = true)]
    warning_style: WarningFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum WarningFormat {
    Short,
    Detailed,
}

impl From<WarningFormat> for WarningStyle {
    fn from(format: WarningFormat) -> Self {
        match format {
            WarningFormat::Short => WarningStyle::Short,
            WarningFormat::Detailed => WarningStyle::Detailed,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append new samples from batch summaries to the catalog
    UpdateSamples {
        results_path: PathBuf,
        #[command(flatten)]
        update: UpdateArgs,
    },
    /// Filter the catalog
    Filter {
        results_path: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Restrict a samples file to samples present in cattle and movement data
    Consistify {
        results_path: PathBuf,
        /// Samples file to consistify
        #[arg(long)]
        samples_filepath: PathBuf,
        #[arg(long)]
        cross_validation_dir: PathBuf,
        /// Key column in cattle.csv and movement.csv
        #[arg(long, default_value = "Sample")]
        cross_key_column: String,
    },
    /// Build the SNP matrix (and optionally a tree) for a samples file
    Phylo {
        results_path: PathBuf,
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Update the catalog, then filter it
    UpdateAndFilter {
        results_path: PathBuf,
        #[command(flatten)]
        update: UpdateArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Filter the catalog, then build
    FilterAndPhylo {
        results_path: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Update, filter and build
    FullPipeline {
        results_path: PathBuf,
        #[command(flatten)]
        update: UpdateArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Directory searched for FinalOut*.csv batch summaries
    #[arg(long)]
    batch_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// JSON filter criteria; cannot be combined with criteria flags
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, num_args = 1..)]
    sample_name: Option<Vec<String>>,

    #[arg(long, num_args = 1..)]
    clade: Option<Vec<String>>,

    #[arg(long, num_args = 1..)]
    flag: Option<Vec<String>>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    pcmapped: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    genomecov: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    n_count: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
    meandepth: Option<Vec<f64>>,
}

impl FilterArgs {
    fn into_source(self) -> btb_phylo::Result<FilterSource> {
        let mut spec = FilterSpec::new();
        for (column, values) in [("Sample", self.sample_name), ("group", self.clade), ("flag", self.flag)] {
            if let Some(values) = values {
                spec = spec.with_values(column, values);
            }
        }
        for (column, range) in [
            ("pcMapped", self.pcmapped),
            ("GenomeCov", self.genomecov),
            ("Ncount", self.n_count),
            ("MeanDepth", self.meandepth),
        ] {
            if let Some([min, max]) = range.as_deref() {
                spec = spec.with_range(column, *min, *max);
            }
        }
        FilterSource::from_options(self.config, spec)
    }
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// Directory holding cattle.csv and movement.csv; enables consistify
    #[arg(long)]
    cross_validation_dir: Option<PathBuf>,

    /// Key column in cattle.csv and movement.csv
    #[arg(long, default_value = "Sample")]
    cross_key_column: String,

    /// clade,maxN table; filters each clade separately
    #[arg(long)]
    clade_info: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Samples file to build from
    #[arg(long, conflicts_with = "discover_input")]
    samples_filepath: Option<PathBuf>,

    /// Deprecated: use the latest samples snapshot in <results>/metadata
    #[arg(long)]
    discover_input: bool,
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Consensus sequence cache (default: <results>/consensus)
    #[arg(long)]
    consensus_path: Option<PathBuf>,

    /// Only download consensus sequences
    #[arg(long)]
    download_only: bool,

    /// Threads for snp-dists
    #[arg(short = 'j', long, default_value_t = 1)]
    n_threads: usize,

    /// Build a maximum parsimony tree with megacc
    #[arg(long)]
    build_tree: bool,

    /// Keep bulky intermediate FASTA files out of the results directory
    #[arg(long)]
    light_mode: bool,

    /// Parent directory for light-mode scratch space
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    #[arg(long, env = "SNP_SITES_BIN", default_value = "snp-sites")]
    snp_sites_bin: PathBuf,

    #[arg(long, env = "SNP_DISTS_BIN", default_value = "snp-dists")]
    snp_dists_bin: PathBuf,

    #[arg(long, env = "MEGACC_BIN", default_value = "megacc")]
    megacc_bin: PathBuf,

    /// MEGA analysis options file
    #[arg(long, default_value = "infer_MP.mao")]
    mao_file: PathBuf,
}

impl BuildArgs {
    fn apply(self, config: &mut PipelineConfig) -> CommandLineTools {
        if let Some(consensus) = self.consensus_path {
            config.consensus_dir = consensus;
        }
        config.build = BuildOptions {
            threads: self.n_threads,
            build_tree: self.build_tree,
            download_only: self.download_only,
        };
        config.light_mode = self.light_mode;
        config.scratch_root = self.scratch_dir;

        CommandLineTools {
            snp_sites: self.snp_sites_bin,
            snp_dists: self.snp_dists_bin,
            megacc: self.megacc_bin,
            mao_file: self.mao_file,
        }
    }
}

fn apply_selection(config: &mut PipelineConfig, selection: SelectionArgs) {
    config.cross_validation_dir = selection.cross_validation_dir;
    config.cross_key_column = selection.cross_key_column;
    config.clade_thresholds = selection.clade_info;
}

/// Turn the parsed command line into a run plan, its configuration and the
/// tools to run
fn prepare(cli: Cli) -> Result<(RunPlan, PipelineConfig, CommandLineTools)> {
    let new_config = |results_path: PathBuf| {
        let mut config = PipelineConfig::new(results_path, cli.summary_filepath.clone());
        config.warning_style = cli.warning_style.into();
        config
    };
    let mut tools = CommandLineTools::default();

    let (plan, config) = match cli.command {
        Command::UpdateSamples { results_path, update } => {
            let mut config = new_config(results_path);
            config.batch_dir = update.batch_dir;
            (RunPlan::UpdateSamples, config)
        }
        Command::Filter {
            results_path,
            filter,
            selection,
        } => {
            let mut config = new_config(results_path);
            config.filter = filter.into_source()?;
            apply_selection(&mut config, selection);
            (RunPlan::Filter, config)
        }
        Command::Consistify {
            results_path,
            samples_filepath,
            cross_validation_dir,
            cross_key_column,
        } => {
            let mut config = new_config(results_path);
            config.input = StageInput::File(samples_filepath);
            config.cross_validation_dir = Some(cross_validation_dir);
            config.cross_key_column = cross_key_column;
            (RunPlan::Consistify, config)
        }
        Command::Phylo {
            results_path,
            input,
            build,
        } => {
            let mut config = new_config(results_path);
            config.input = match (input.samples_filepath, input.discover_input) {
                (Some(path), _) => StageInput::File(path),
                (None, true) => StageInput::Discover,
                (None, false) => anyhow::bail!("phylo needs --samples-filepath (or the deprecated --discover-input)"),
            };
            tools = build.apply(&mut config);
            (RunPlan::Phylo, config)
        }
        Command::UpdateAndFilter {
            results_path,
            update,
            filter,
            selection,
        } => {
            let mut config = new_config(results_path);
            config.batch_dir = update.batch_dir;
            config.filter = filter.into_source()?;
            apply_selection(&mut config, selection);
            (RunPlan::UpdateAndFilter, config)
        }
        Command::FilterAndPhylo {
            results_path,
            filter,
            selection,
            build,
        } => {
            let mut config = new_config(results_path);
            config.filter = filter.into_source()?;
            apply_selection(&mut config, selection);
            tools = build.apply(&mut config);
            (RunPlan::FilterAndPhylo, config)
        }
        Command::FullPipeline {
            results_path,
            update,
            filter,
            selection,
            build,
        } => {
            let mut config = new_config(results_path);
            config.batch_dir = update.batch_dir;
            config.filter = filter.into_source()?;
            apply_selection(&mut config, selection);
            tools = build.apply(&mut config);
            (RunPlan::FullPipeline, config)
        }
    };

    Ok((plan, config, tools))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btb_phylo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = LocalObjectStore::new(&cli.object_store_root);
    let (plan, config, tools) = prepare(cli)?;

    info!("btb-phylo {} starting {:?}", env!("CARGO_PKG_VERSION"), plan);
    let orchestrator = PipelineOrchestrator::new(config, store, tools);

    match orchestrator.run(plan).await {
        Ok(report) => {
            info!(
                "Run complete: {} samples, {} warning(s), metadata at {:?}",
                report.records.len(),
                report.warnings.len(),
                report.metadata_path
            );
            Ok(())
        }
        Err(e) => {
            error!("Run failed [{:?}]: {}", e.kind(), e);
            Err(e).context("btb-phylo run failed")
        }
    }
}
