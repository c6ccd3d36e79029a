use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::IngestError;

/// Toolkit output for one parsed, sanitized structure.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStructure {
    pub canonical: String,
    pub exact_weight: f64,
}

/// One minimized 3D geometry. `molblock` is a single MDL record without the
/// `$$$$` terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Conformer {
    pub index: usize,
    pub energy: f64,
    pub molblock: String,
}

/// The chemistry this crate relies on but does not implement.
pub trait ChemToolkit: Send + Sync {
    /// Parses and sanitizes `smiles`, returning canonical isomeric SMILES
    /// and the exact molecular weight.
    fn prepare(&self, smiles: &str) -> Result<PreparedStructure, IngestError>;

    /// Embeds `count` candidate geometries and minimizes each with the
    /// toolkit force field.
    fn embed_minimized(
        &self,
        smiles: &str,
        count: usize,
        seed: u64,
    ) -> Result<Vec<Conformer>, IngestError>;

    /// RMS distance between two geometries of the same molecule after
    /// optimal alignment.
    fn rms(&self, a: &Conformer, b: &Conformer) -> Result<f64, IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolkitStatus {
    Ready,
    Missing { tool: &'static str },
}

/// Drives the Open Babel command line tools.
#[derive(Debug, Clone)]
pub struct OpenBabelToolkit {
    obabel: Option<PathBuf>,
    obminimize: Option<PathBuf>,
    obenergy: Option<PathBuf>,
    obrms: Option<PathBuf>,
    force_field: String,
}

impl OpenBabelToolkit {
    /// Looks the tools up in `bin_dir` when given, otherwise on `PATH`.
    pub fn new(bin_dir: Option<&Path>) -> Self {
        let locate = |name: &str| match bin_dir {
            Some(dir) => Some(dir.join(name)).filter(|path| path.exists()),
            None => find_in_path(name),
        };
        Self {
            obabel: locate("obabel"),
            obminimize: locate("obminimize"),
            obenergy: locate("obenergy"),
            obrms: locate("obrms"),
            force_field: "UFF".to_string(),
        }
    }

    pub fn status(&self) -> ToolkitStatus {
        let tools = [
            ("obabel", &self.obabel),
            ("obminimize", &self.obminimize),
            ("obenergy", &self.obenergy),
            ("obrms", &self.obrms),
        ];
        for (tool, path) in tools {
            if path.is_none() {
                return ToolkitStatus::Missing { tool };
            }
        }
        ToolkitStatus::Ready
    }

    fn require<'a>(path: &'a Option<PathBuf>, name: &str) -> Result<&'a Path, IngestError> {
        path.as_deref().ok_or_else(|| IngestError::MissingTool(name.to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<String, IngestError> {
        debug!(program = %program.display(), ?args, "running toolkit command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| IngestError::Toolkit(format!("{}: {err}", program.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("command failed: {}", program.display())
            } else {
                stderr
            };
            return Err(IngestError::Toolkit(message));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn scratch_dir() -> Result<tempfile::TempDir, IngestError> {
        tempfile::Builder::new()
            .prefix("pharmit-obabel")
            .tempdir()
            .map_err(|err| IngestError::Filesystem(err.to_string()))
    }
}

impl ChemToolkit for OpenBabelToolkit {
    fn prepare(&self, smiles: &str) -> Result<PreparedStructure, IngestError> {
        let obabel = Self::require(&self.obabel, "obabel")?;
        let args = vec![
            format!("-:{smiles}"),
            "-ocan".to_string(),
            "--append".to_string(),
            "exactmass".to_string(),
        ];
        let stdout = self.run_cmd(obabel, &args)?;
        parse_prepared(&stdout).ok_or_else(|| IngestError::StructureParse {
            smiles: smiles.to_string(),
            message: "toolkit could not parse or sanitize structure".to_string(),
        })
    }

    fn embed_minimized(
        &self,
        smiles: &str,
        count: usize,
        seed: u64,
    ) -> Result<Vec<Conformer>, IngestError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let obabel = Self::require(&self.obabel, "obabel")?;
        let obminimize = Self::require(&self.obminimize, "obminimize")?;
        let obenergy = Self::require(&self.obenergy, "obenergy")?;

        // Open Babel seeds its own generator; the value is kept for the log.
        debug!(seed, count, "embedding candidates");
        let scratch = Self::scratch_dir()?;
        let embedded = scratch.path().join("embedded.sdf");
        let minimized = scratch.path().join("minimized.sdf");

        self.run_cmd(
            obabel,
            &[
                format!("-:{smiles}"),
                "-h".to_string(),
                "--gen3d".to_string(),
                "--conformer".to_string(),
                "--nconf".to_string(),
                count.to_string(),
                "--writeconformers".to_string(),
                "-osdf".to_string(),
                "-O".to_string(),
                embedded.to_string_lossy().to_string(),
            ],
        )?;
        let minimized_sdf = self.run_cmd(
            obminimize,
            &[
                "-ff".to_string(),
                self.force_field.clone(),
                "-osdf".to_string(),
                embedded.to_string_lossy().to_string(),
            ],
        )?;
        fs::write(&minimized, &minimized_sdf)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let energy_report = self.run_cmd(
            obenergy,
            &[
                "-ff".to_string(),
                self.force_field.clone(),
                minimized.to_string_lossy().to_string(),
            ],
        )?;

        let blocks = split_records(&minimized_sdf);
        let energies = parse_energies(&energy_report);
        if blocks.len() != energies.len() {
            return Err(IngestError::Toolkit(format!(
                "obenergy reported {} energies for {} conformers",
                energies.len(),
                blocks.len()
            )));
        }
        Ok(blocks
            .into_iter()
            .zip(energies)
            .take(count)
            .enumerate()
            .map(|(index, (molblock, energy))| Conformer {
                index,
                energy,
                molblock,
            })
            .collect())
    }

    fn rms(&self, a: &Conformer, b: &Conformer) -> Result<f64, IngestError> {
        let obrms = Self::require(&self.obrms, "obrms")?;
        let scratch = Self::scratch_dir()?;
        let reference = scratch.path().join("reference.sdf");
        let test = scratch.path().join("test.sdf");
        fs::write(&reference, format!("{}\n$$$$\n", a.molblock))
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        fs::write(&test, format!("{}\n$$$$\n", b.molblock))
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let stdout = self.run_cmd(obrms, &rms_args(&reference, &test))?;
        parse_rms(&stdout)
            .ok_or_else(|| IngestError::Toolkit(format!("unexpected obrms output: {stdout}")))
    }
}

/// `obabel -ocan --append exactmass` prints `<smiles>\t<mass>`.
fn parse_prepared(stdout: &str) -> Option<PreparedStructure> {
    let line = stdout.lines().find(|line| !line.trim().is_empty())?;
    let mut tokens = line.split_whitespace();
    let canonical = tokens.next()?.to_string();
    let exact_weight = tokens.last()?.parse::<f64>().ok()?;
    Some(PreparedStructure {
        canonical,
        exact_weight,
    })
}

/// Splits SDF text into records, dropping the `$$$$` terminators.
pub fn split_records(sdf: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = Vec::new();
    for line in sdf.lines() {
        if line.starts_with("$$$$") {
            records.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    if current.iter().any(|line| !line.trim().is_empty()) {
        records.push(current.join("\n"));
    }
    records
}

/// Collects `TOTAL ENERGY = <value> <unit>` lines in record order.
fn parse_energies(report: &str) -> Vec<f64> {
    report
        .lines()
        .filter_map(|line| line.trim().strip_prefix("TOTAL ENERGY ="))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|value| value.parse::<f64>().ok())
        .collect()
}

/// `-m` superimposes the test geometry on the reference before measuring.
fn rms_args(reference: &Path, test: &Path) -> Vec<String> {
    vec![
        "-m".to_string(),
        reference.to_string_lossy().to_string(),
        test.to_string_lossy().to_string(),
    ]
}

/// `obrms` prints `RMSD <ref>:<test> <value>` per comparison.
fn parse_rms(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find(|line| line.starts_with("RMSD"))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|value| value.parse::<f64>().ok())
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_with_mass() {
        let prepared = parse_prepared("CCO\t46.0419\n").unwrap();
        assert_eq!(prepared.canonical, "CCO");
        assert!((prepared.exact_weight - 46.0419).abs() < 1e-9);
        assert!(parse_prepared("").is_none());
    }

    #[test]
    fn parses_energy_report() {
        let report = "\
A T O M   T Y P E S
TOTAL ENERGY = 12.34567 kJ/mol
junk
TOTAL ENERGY = -3.5 kJ/mol
";
        assert_eq!(parse_energies(report), vec![12.34567, -3.5]);
    }

    #[test]
    fn parses_rms_line() {
        assert_eq!(parse_rms("RMSD a:b 0.4521\n"), Some(0.4521));
        assert_eq!(parse_rms("nothing"), None);
    }

    #[test]
    fn rms_is_measured_after_alignment() {
        let args = rms_args(Path::new("/tmp/ref.sdf"), Path::new("/tmp/test.sdf"));
        assert_eq!(args, vec!["-m", "/tmp/ref.sdf", "/tmp/test.sdf"]);
    }

    #[test]
    fn splits_sdf_records() {
        let sdf = "one\n  M  END\n$$$$\ntwo\nM  END\n$$$$\n";
        let records = split_records(sdf);
        assert_eq!(records.len(), 2);
        assert!(records[1].starts_with("two"));
    }

    #[test]
    fn missing_tools_reported() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = OpenBabelToolkit::new(Some(dir.path()));
        assert_eq!(toolkit.status(), ToolkitStatus::Missing { tool: "obabel" });
        assert!(matches!(
            toolkit.prepare("CCO"),
            Err(IngestError::MissingTool(_))
        ));
    }
}
