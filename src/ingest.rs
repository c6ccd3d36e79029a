use std::io::BufRead;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConformerParams;
use crate::dispatch::{PoolReport, WorkerPool, default_worker_count};
use crate::domain::{CanonicalSmiles, InputRecord, Registration, parent_component};
use crate::ensemble::{ConformerJob, generate_ensemble};
use crate::error::IngestError;
use crate::layout::{Partitioning, PrefixRing};
use crate::store::{ConformerStore, StoreConnector};
use crate::toolkit::ChemToolkit;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub params: ConformerParams,
    pub replace: bool,
    /// Zero selects the available parallelism.
    pub threads: usize,
    pub partitioning: Partitioning,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            params: ConformerParams::default(),
            replace: false,
            threads: 0,
            partitioning: Partitioning::new(10_000),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub lines_read: usize,
    pub registered_new: usize,
    pub registered_existing: usize,
    pub skipped_missing_name: usize,
    pub skipped_unparsable: usize,
    pub skipped_oversized: usize,
    pub failed_lines: usize,
    pub dispatched: usize,
    pub workers: PoolReport,
    pub started_at: String,
    pub finished_at: String,
}

/// A compound ready for registration.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCompound {
    pub name: String,
    pub canonical: CanonicalSmiles,
    pub exact_weight: f64,
}

/// Reduces `smiles` to its parent component and canonicalizes it.
pub fn canonicalize<T>(
    toolkit: &T,
    smiles: &str,
    name: &str,
) -> Result<(CanonicalSmiles, f64), IngestError>
where
    T: ChemToolkit + ?Sized,
{
    let parent = parent_component(smiles);
    let prepared = toolkit.prepare(parent)?;
    let canonical = CanonicalSmiles::new(prepared.canonical, name)?;
    Ok((canonical, prepared.exact_weight))
}

pub struct Ingestor<T: ChemToolkit, C: StoreConnector> {
    toolkit: Arc<T>,
    connector: Arc<C>,
    options: IngestOptions,
}

impl<T, C> Ingestor<T, C>
where
    T: ChemToolkit + 'static,
    C: StoreConnector + 'static,
{
    pub fn new(toolkit: T, connector: C, options: IngestOptions) -> Self {
        Self {
            toolkit: Arc::new(toolkit),
            connector: Arc::new(connector),
            options,
        }
    }

    pub fn prepare_line(&self, line: &str) -> Result<PreparedCompound, IngestError> {
        let record: InputRecord = line.parse()?;
        let (canonical, exact_weight) =
            canonicalize(self.toolkit.as_ref(), &record.smiles, &record.name)?;
        Ok(PreparedCompound {
            name: record.name,
            canonical,
            exact_weight,
        })
    }

    /// Registers every compound of `input` and generates conformers for the
    /// new ones (all of them with `replace`). Bad lines are logged and
    /// skipped; only unreadable input or a broken pool abort the run.
    pub fn run<R: BufRead>(
        &self,
        mut input: R,
        prefixes: Vec<Utf8PathBuf>,
    ) -> Result<IngestSummary, IngestError> {
        let mut summary = IngestSummary {
            started_at: iso_timestamp(),
            ..IngestSummary::default()
        };
        let mut ring = PrefixRing::new(prefixes)?;
        self.options.params.validate()?;
        let mut store = self.connector.connect()?;

        let workers = match self.options.threads {
            0 => default_worker_count(),
            threads => threads,
        };
        let pool = self.spawn_workers(workers)?;
        info!(workers, prefixes = ring.len(), "running conformer workers");

        let mut fatal = None;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match input.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    fatal = Some(IngestError::Filesystem(format!("read input: {err}")));
                    break;
                }
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(_) => {
                    summary.lines_read += 1;
                    summary.skipped_unparsable += 1;
                    let lossy = String::from_utf8_lossy(&buf);
                    warn!(line = %lossy.trim(), "skipping input line that is not valid UTF-8");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            summary.lines_read += 1;

            let (registration, canonical) = match self.register_line(&mut store, line) {
                Ok(registered) => registered,
                Err(err) => {
                    record_skip(&mut summary, &err);
                    warn!(line = %line.trim(), error = %err, "skipping input line");
                    continue;
                }
            };
            if registration.is_new {
                summary.registered_new += 1;
            } else {
                summary.registered_existing += 1;
            }

            if registration.is_new || self.options.replace {
                let job = ConformerJob {
                    id: registration.id,
                    canonical,
                    prefix: ring.next_prefix(),
                };
                if let Err(err) = pool.submit(job) {
                    fatal = Some(err);
                    break;
                }
                summary.dispatched += 1;
            }
        }
        drop(store);

        summary.workers = pool.shutdown()?;
        summary.finished_at = iso_timestamp();
        if let Some(err) = fatal {
            return Err(err);
        }
        info!(
            lines = summary.lines_read,
            new = summary.registered_new,
            dispatched = summary.dispatched,
            failed_jobs = summary.workers.failed,
            "ingestion finished"
        );
        Ok(summary)
    }

    fn register_line(
        &self,
        store: &mut C::Store,
        line: &str,
    ) -> Result<(Registration, CanonicalSmiles), IngestError> {
        let compound = self.prepare_line(line)?;
        let registration =
            store.register(&compound.canonical, compound.exact_weight, &compound.name)?;
        debug!(id = %registration.id, smiles = %compound.canonical, "registered compound");
        Ok((registration, compound.canonical))
    }

    fn spawn_workers(&self, workers: usize) -> Result<WorkerPool<ConformerJob>, IngestError> {
        let toolkit = Arc::clone(&self.toolkit);
        let connector = Arc::clone(&self.connector);
        let params = self.options.params.clone();
        let partitioning = self.options.partitioning;
        WorkerPool::spawn(workers, move |job: ConformerJob| {
            generate_ensemble(
                toolkit.as_ref(),
                connector.as_ref(),
                &params,
                partitioning,
                &job,
            )
            .map(|_| ())
        })
    }
}

fn record_skip(summary: &mut IngestSummary, err: &IngestError) {
    match err {
        IngestError::MissingName(_) => summary.skipped_missing_name += 1,
        IngestError::StructureParse { .. } => summary.skipped_unparsable += 1,
        IngestError::OversizedStructure { .. } => summary.skipped_oversized += 1,
        _ => summary.failed_lines += 1,
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
