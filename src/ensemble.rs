//! Conformer ensemble selection and storage.
//!
//! Candidates come back from the toolkit already minimized. They are walked
//! in ascending energy order and admitted greedily while the ensemble has
//! room, the candidate sits inside the energy window, and it is farther than
//! the RMS threshold from every member admitted so far.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

use crate::config::ConformerParams;
use crate::domain::{CanonicalSmiles, CompoundId};
use crate::error::IngestError;
use crate::layout::{Partitioning, ensure_dir};
use crate::store::{ConformerStore, StoreConnector};
use crate::toolkit::{ChemToolkit, Conformer};

/// Limits applied while walking the energy-sorted candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionLimits {
    pub max_confs: usize,
    pub rms_threshold: f64,
    pub energy_window: f64,
}

impl From<&ConformerParams> for SelectionLimits {
    fn from(params: &ConformerParams) -> Self {
        Self {
            max_confs: params.max_confs,
            rms_threshold: params.rms_threshold,
            energy_window: params.energy_window,
        }
    }
}

pub fn select_conformers<F>(
    mut candidates: Vec<Conformer>,
    limits: SelectionLimits,
    mut distance: F,
) -> Result<Vec<Conformer>, IngestError>
where
    F: FnMut(&Conformer, &Conformer) -> Result<f64, IngestError>,
{
    candidates.sort_by(|a, b| a.energy.total_cmp(&b.energy));
    let min_energy = candidates.first().map(|conf| conf.energy).unwrap_or(0.0);

    let mut admitted: Vec<Conformer> = Vec::new();
    'candidates: for candidate in candidates {
        if admitted.len() >= limits.max_confs {
            break;
        }
        // Sorted by energy, so nothing later can re-enter the window.
        let delta = candidate.energy - min_energy;
        if delta.is_nan() || delta > limits.energy_window {
            break;
        }
        for member in &admitted {
            if distance(member, &candidate)? <= limits.rms_threshold {
                continue 'candidates;
            }
        }
        admitted.push(candidate);
    }
    Ok(admitted)
}

/// Writes `conformers` as gzip SDF, each record titled with `id`. The file
/// is staged next to `path` and renamed into place.
pub fn write_ensemble(
    path: &Utf8Path,
    id: CompoundId,
    conformers: &[Conformer],
) -> Result<(), IngestError> {
    let parent = path
        .parent()
        .ok_or_else(|| IngestError::Filesystem(format!("invalid ensemble path: {path}")))?;
    let temp = tempfile::Builder::new()
        .prefix("pharmit-ensemble")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;

    let mut encoder = GzEncoder::new(temp, Compression::default());
    let title = id.to_string();
    for conformer in conformers {
        let record = retitle(&conformer.molblock, &title);
        write!(encoder, "{record}\n$$$$\n")
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    }
    let temp = encoder
        .finish()
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;

    temp.persist(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Replaces the header (first) line of an MDL record.
fn retitle(molblock: &str, title: &str) -> String {
    let body = molblock.trim_end_matches(['\r', '\n']);
    match body.split_once('\n') {
        Some((_, rest)) => format!("{title}\n{rest}"),
        None => title.to_string(),
    }
}

/// One compound queued for conformer generation.
#[derive(Debug, Clone)]
pub struct ConformerJob {
    pub id: CompoundId,
    pub canonical: CanonicalSmiles,
    pub prefix: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct EnsembleReport {
    pub id: CompoundId,
    pub candidates: usize,
    pub conformers: usize,
    pub path: Utf8PathBuf,
}

/// Generates, filters and stores the ensemble for `job`, then records the
/// result in a store handle held only for the update.
pub fn generate_ensemble<T, C>(
    toolkit: &T,
    connector: &C,
    params: &ConformerParams,
    partitioning: Partitioning,
    job: &ConformerJob,
) -> Result<EnsembleReport, IngestError>
where
    T: ChemToolkit + ?Sized,
    C: StoreConnector + ?Sized,
{
    let candidates =
        toolkit.embed_minimized(job.canonical.as_str(), params.sample_count(), params.seed)?;
    let candidate_count = candidates.len();
    let selected = select_conformers(candidates, SelectionLimits::from(params), |a, b| {
        toolkit.rms(a, b)
    })?;

    ensure_dir(&partitioning.directory(&job.prefix, job.id))?;
    let path = partitioning.file_path(&job.prefix, job.id);
    write_ensemble(&path, job.id, &selected)?;

    let mut store = connector.connect()?;
    if !store.record_conformers(job.id, &job.canonical, selected.len(), &path)? {
        warn!(id = %job.id, smiles = %job.canonical, "no store row matched ensemble update");
    }
    debug!(
        id = %job.id,
        candidates = candidate_count,
        conformers = selected.len(),
        path = %path,
        "wrote conformer ensemble"
    );

    Ok(EnsembleReport {
        id: job.id,
        candidates: candidate_count,
        conformers: selected.len(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conformer(index: usize, energy: f64) -> Conformer {
        Conformer {
            index,
            energy,
            molblock: format!("conf{index}\n  test\n\n  0  0  0  0  0  0  0  0  0  0999 V2000\nM  END"),
        }
    }

    fn limits(max_confs: usize) -> SelectionLimits {
        SelectionLimits {
            max_confs,
            rms_threshold: 0.5,
            energy_window: 10.0,
        }
    }

    #[test]
    fn energy_window_stops_scan() {
        let candidates = vec![conformer(0, 5.0), conformer(1, 16.0), conformer(2, 14.9)];
        let selected = select_conformers(candidates, limits(10), |_, _| Ok(1.0)).unwrap();
        let kept: Vec<usize> = selected.iter().map(|conf| conf.index).collect();
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn similar_geometry_is_skipped_not_terminal() {
        let candidates = vec![conformer(0, 0.0), conformer(1, 1.0), conformer(2, 2.0)];
        let selected = select_conformers(candidates, limits(10), |a, b| {
            Ok(if a.index == 0 && b.index == 1 { 0.2 } else { 1.0 })
        })
        .unwrap();
        let kept: Vec<usize> = selected.iter().map(|conf| conf.index).collect();
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn distance_equal_to_threshold_is_rejected() {
        let candidates = vec![conformer(0, 0.0), conformer(1, 1.0)];
        let selected = select_conformers(candidates, limits(10), |_, _| Ok(0.5)).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn retitle_replaces_header_only() {
        let block = "old\n  prog\n\nbody";
        assert_eq!(retitle(block, "17"), "17\n  prog\n\nbody");
    }
}
