//! Trial match-tree evaluation engine executable.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::Term;
use serde::Deserialize;

use trial_match_engine::config::EngineConfig;
use trial_match_engine::driver::run_batch;
use trial_match_engine::model::trial::TrialDocument;
use trial_match_engine::model::{ClinicalRecord, GenomicRecord};
use trial_match_engine::oncotree::Oncotree;
use trial_match_engine::store::{InMemoryStore, TrialMatchSink};
use trial_match_engine::vocab::VocabularyTable;

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clinical trial match-tree evaluation engine",
    long_about = "Evaluates match-tree criteria for open clinical trials against a population of patient records and emits trial-match records."
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: CommonArgs,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Verbosity of the program
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate every trial document in a fixture batch and write trial-match output.
    Run(RunArgs),
    /// Print the built-in trial-vocabulary to store-vocabulary key translation table.
    VocabDump,
    /// Expand an oncotree diagnosis label (or `_SOLID_`/`_LIQUID_`) to its covering set.
    OncotreeExpand(OncotreeExpandArgs),
}

/// Parsing of "run" sub command arguments. Reads flat JSON fixture files in the shape the
/// `InMemoryStore` expects; the real document store is the engine's external collaborator
/// and is wired up by the deployment, not by this CLI.
#[derive(Debug, Args)]
struct RunArgs {
    /// Path to a JSON array of clinical records.
    #[arg(long)]
    clinical: PathBuf,
    /// Path to a JSON array of genomic records.
    #[arg(long)]
    genomic: PathBuf,
    /// Path to a JSON array of trial documents.
    #[arg(long)]
    trials: PathBuf,
    /// Path to a JSON array of `{parent_text, text}` oncotree edges.
    #[arg(long)]
    oncotree: PathBuf,
    /// Where to write the resulting JSON array of trial-match records.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct OncotreeExpandArgs {
    /// Path to a JSON array of `{parent_text, text}` oncotree edges.
    #[arg(long)]
    oncotree: PathBuf,
    /// The diagnosis label to expand, or `_SOLID_`/`_LIQUID_`.
    label: String,
}

#[derive(Debug, Deserialize)]
struct OncotreeEdgeRecord {
    parent_text: Option<String>,
    text: String,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, anyhow::Error> {
    let file = File::open(path).map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

fn load_oncotree(path: &PathBuf) -> Result<Oncotree, anyhow::Error> {
    let edges: Vec<OncotreeEdgeRecord> = load_json(path)?;
    Ok(Oncotree::build(edges.into_iter().map(|e| trial_match_engine::oncotree::OncotreeEdge {
        parent_text: e.parent_text,
        text: e.text,
    })))
}

fn run_batch_cmd(args: &RunArgs, term: &Term) -> Result<(), anyhow::Error> {
    let clinical: Vec<ClinicalRecord> = load_json(&args.clinical)?;
    let genomic: Vec<GenomicRecord> = load_json(&args.genomic)?;
    let trials: Vec<TrialDocument> = load_json(&args.trials)?;
    let oncotree = load_oncotree(&args.oncotree)?;

    let config = EngineConfig::new(oncotree);
    let mut store = InMemoryStore::new(clinical, genomic, trials);
    let today = chrono::Local::now().date_naive();

    run_batch(&mut store, &config, today)?;

    let out_file = File::create(&args.out)?;
    serde_json::to_writer_pretty(BufWriter::new(out_file), &store.all_matches()?)?;
    term.write_line(&format!("wrote trial-match records to {}", args.out.display()))?;
    Ok(())
}

fn vocab_dump() -> Result<(), anyhow::Error> {
    let table = VocabularyTable::new();
    let mut entries: Vec<_> = table.key_table().iter().collect();
    entries.sort_by_key(|(k, _)| k.clone());
    for (trial_key, store_key) in entries {
        println!("{trial_key} -> {store_key}");
    }
    Ok(())
}

fn oncotree_expand(args: &OncotreeExpandArgs) -> Result<(), anyhow::Error> {
    let oncotree = load_oncotree(&args.oncotree)?;
    let mut labels: Vec<String> = oncotree.expand(&args.label).into_iter().collect();
    labels.sort();
    for label in labels {
        println!("{label}");
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || match &cli.command {
        Commands::Run(args) => run_batch_cmd(args, &term),
        Commands::VocabDump => vocab_dump(),
        Commands::OncotreeExpand(args) => oncotree_expand(args),
    })
}
