use std::io::{self, BufWriter};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pharmit_ingest::archive::{FtpArchive, scan_archives};

#[derive(Parser)]
#[command(name = "pharmit-nscids")]
#[command(about = "List PubChem CID and NSC name pairs from the substance archive")]
#[command(version, author)]
struct Cli {}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let _cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut archive = FtpArchive::pubchem_substances()?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = scan_archives(&mut archive, &mut out)?;
    archive.close()?;
    info!(members = summary.members, pairs = summary.pairs, "archive scan finished");
    Ok(())
}
