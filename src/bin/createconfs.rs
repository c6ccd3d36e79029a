use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pharmit_ingest::config::{ConfigLoader, ConformerParams, load_prefixes};
use pharmit_ingest::error::IngestError;
use pharmit_ingest::ingest::{IngestOptions, Ingestor};
use pharmit_ingest::layout::Partitioning;
use pharmit_ingest::output::JsonOutput;
use pharmit_ingest::store::SqliteConnector;
use pharmit_ingest::toolkit::{OpenBabelToolkit, ToolkitStatus};

#[derive(Parser)]
#[command(name = "pharmit-createconfs")]
#[command(about = "Register compounds and generate low-energy conformer ensembles")]
#[command(version, author)]
struct Cli {
    /// Input file with one `<smiles> <name>` pair per line
    input: PathBuf,

    /// Maximum number of conformers kept per compound
    #[arg(long, alias = "max_confs", default_value_t = 20)]
    maxconfs: usize,

    /// Candidate embeddings per kept conformer
    #[arg(long, alias = "sample_multiplier", default_value_t = 1.0)]
    sample_multiplier: f64,

    /// Embedding seed (the Open Babel backend cannot be seeded and only logs it)
    #[arg(long, default_value_t = 9_162_006)]
    seed: u64,

    /// Minimum RMS distance between kept conformers
    #[arg(long, alias = "rms_threshold", default_value_t = 0.7)]
    rms_threshold: f64,

    /// Maximum energy above the lowest conformer
    #[arg(long, alias = "energy_window", default_value_t = 10.0)]
    energy_window: f64,

    /// Regenerate conformers for compounds already in the store
    #[arg(short, long)]
    replace: bool,

    /// Worker threads (0 uses the available parallelism)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Ids per output subdirectory (0 writes files directly under the prefix)
    #[arg(long, default_value_t = 10_000)]
    subdirmod: u64,

    /// File listing one storage directory per line
    #[arg(short, long)]
    prefixes: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    database: Option<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    /// Directory holding the Open Babel binaries
    #[arg(long)]
    toolkit_dir: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::InvalidParameter(_)
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::PrefixRead(_)
        | IngestError::NoPrefixes
        | IngestError::InputRead(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let params = ConformerParams {
        max_confs: cli.maxconfs,
        sample_multiplier: cli.sample_multiplier,
        seed: cli.seed,
        rms_threshold: cli.rms_threshold,
        energy_window: cli.energy_window,
    };
    params.validate()?;
    let prefixes = load_prefixes(&cli.prefixes)?;

    let input = File::open(&cli.input).map_err(|_| IngestError::InputRead(cli.input.clone()))?;

    let toolkit_dir = cli.toolkit_dir.or(resolved.toolkit_dir);
    let toolkit = OpenBabelToolkit::new(toolkit_dir.as_deref());
    if let ToolkitStatus::Missing { tool } = toolkit.status() {
        return Err(IngestError::MissingTool(tool.to_string()).into());
    }

    let connector = SqliteConnector::new(cli.database.unwrap_or(resolved.database));
    info!(
        database = %connector.path(),
        input = %cli.input.display(),
        "starting conformer ingestion"
    );

    let options = IngestOptions {
        params,
        replace: cli.replace,
        threads: cli.threads,
        partitioning: Partitioning::new(cli.subdirmod),
    };
    let ingestor = Ingestor::new(toolkit, connector, options);
    let summary = ingestor.run(BufReader::new(input), prefixes)?;

    if cli.json {
        JsonOutput::print_ingest(&summary).map_err(|err| IngestError::Output(err.to_string()))?;
    } else {
        println!(
            "Processed {} lines: {} new, {} existing, {} conformer jobs ({} failed)",
            summary.lines_read,
            summary.registered_new,
            summary.registered_existing,
            summary.dispatched,
            summary.workers.failed
        );
    }
    Ok(())
}
