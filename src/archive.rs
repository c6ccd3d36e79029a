//! NSC name extraction from the PubChem substance archive.
//!
//! Each `.sdf.gz` member of the archive directory is downloaded whole,
//! decompressed and scanned line by line. A record contributes a
//! `<cid> <name>` pair when it carries both a CID association and an
//! `NSC` synonym.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};

use flate2::read::MultiGzDecoder;
use regex::Regex;
use serde::Serialize;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::{debug, info};

use crate::error::IngestError;

pub const PUBCHEM_HOST: &str = "ftp.ncbi.nih.gov:21";
pub const PUBCHEM_SUBSTANCE_DIR: &str = "pubchem/Substance/CURRENT-Full/SDF";
pub const ARCHIVE_SUFFIX: &str = ".sdf.gz";

const CID_TAG: &str = "PUBCHEM_CID_ASSOCIATIONS";
const SYNONYM_TAG: &str = "PUBCHEM_SUBSTANCE_SYNONYM";
const RECORD_END: &str = "$$$$";
const NSC_PREFIX: &str = "NSC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstancePair {
    pub cid: String,
    pub name: String,
}

impl fmt::Display for SubstancePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cid, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    AwaitingCid,
    AwaitingName,
}

pub struct RecordScanner {
    state: ScanState,
    cid: Option<String>,
    name: Option<String>,
    nsc_number: Regex,
}

impl Default for RecordScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Scanning,
            cid: None,
            name: None,
            nsc_number: Regex::new(r"^NSC\d").unwrap(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Advances the scanner by one line (without its line ending) and
    /// returns a pair when the line closes a complete record.
    pub fn feed(&mut self, line: &str) -> Option<SubstancePair> {
        match self.state {
            ScanState::AwaitingCid => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.len() > 1 {
                    self.cid = Some(tokens[0].to_string());
                }
                self.state = ScanState::Scanning;
                None
            }
            ScanState::AwaitingName => {
                let trimmed = line.trim();
                if trimmed.starts_with(RECORD_END) {
                    self.state = ScanState::Scanning;
                    return self.finish_record();
                }
                if trimmed.starts_with(NSC_PREFIX) {
                    self.name = Some(self.normalize_name(trimmed));
                    self.state = ScanState::Scanning;
                } else if trimmed.is_empty() {
                    self.state = ScanState::Scanning;
                }
                None
            }
            ScanState::Scanning => {
                if line.contains(CID_TAG) {
                    self.state = ScanState::AwaitingCid;
                } else if line.contains(SYNONYM_TAG) {
                    self.state = ScanState::AwaitingName;
                } else if line.starts_with(RECORD_END) {
                    return self.finish_record();
                }
                None
            }
        }
    }

    /// Feeds every line of `reader`, handing complete pairs to `emit`.
    pub fn scan<R, F>(&mut self, mut reader: R, mut emit: F) -> Result<usize, IngestError>
    where
        R: BufRead,
        F: FnMut(SubstancePair) -> Result<(), IngestError>,
    {
        let mut emitted = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|err| IngestError::ArchiveTransfer(format!("read record: {err}")))?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(pair) = self.feed(line.trim_end_matches(['\r', '\n'])) {
                emit(pair)?;
                emitted += 1;
            }
        }
        Ok(emitted)
    }

    /// Whitespace is dropped and `NSC<digits>` becomes `NSC-<digits>`.
    pub fn normalize_name(&self, raw: &str) -> String {
        let compact: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
        if self.nsc_number.is_match(&compact) {
            format!("{NSC_PREFIX}-{}", &compact[NSC_PREFIX.len()..])
        } else {
            compact
        }
    }

    // Partial records are never carried into the next one.
    fn finish_record(&mut self) -> Option<SubstancePair> {
        let cid = self.cid.take();
        let name = self.name.take();
        match (cid, name) {
            (Some(cid), Some(name)) => Some(SubstancePair { cid, name }),
            _ => None,
        }
    }
}

/// A remote directory of gzip SDF archive members.
pub trait ArchiveSource {
    fn list(&mut self) -> Result<Vec<String>, IngestError>;
    fn fetch(&mut self, name: &str, destination: &mut File) -> Result<(), IngestError>;
}

/// Anonymous FTP session kept open across every member of the run.
pub struct FtpArchive {
    stream: FtpStream,
}

impl FtpArchive {
    pub fn connect(host: &str, directory: &str) -> Result<Self, IngestError> {
        let mut stream = FtpStream::connect(host).map_err(ftp_error)?;
        stream.login("anonymous", "anonymous@").map_err(ftp_error)?;
        stream.cwd(directory).map_err(ftp_error)?;
        stream.transfer_type(FileType::Binary).map_err(ftp_error)?;
        info!(host, directory, "connected to archive");
        Ok(Self { stream })
    }

    pub fn pubchem_substances() -> Result<Self, IngestError> {
        Self::connect(PUBCHEM_HOST, PUBCHEM_SUBSTANCE_DIR)
    }

    pub fn close(mut self) -> Result<(), IngestError> {
        self.stream.quit().map_err(ftp_error)
    }
}

impl ArchiveSource for FtpArchive {
    fn list(&mut self) -> Result<Vec<String>, IngestError> {
        self.stream.nlst(None).map_err(ftp_error)
    }

    fn fetch(&mut self, name: &str, destination: &mut File) -> Result<(), IngestError> {
        self.stream
            .retr(name, |reader| {
                io::copy(reader, &mut *destination)
                    .map(|_| ())
                    .map_err(suppaftp::FtpError::ConnectionError)
            })
            .map_err(ftp_error)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub members: usize,
    pub pairs: usize,
}

/// Scans every `.sdf.gz` member of `source`, writing one `<cid> <name>` line
/// per complete record to `out` in stream order.
pub fn scan_archives<S, W>(source: &mut S, out: &mut W) -> Result<ScanSummary, IngestError>
where
    S: ArchiveSource + ?Sized,
    W: Write,
{
    let mut summary = ScanSummary::default();
    for name in source.list()? {
        if !name.ends_with(ARCHIVE_SUFFIX) {
            continue;
        }
        debug!(member = %name, "fetching archive member");
        let mut temp =
            tempfile::tempfile().map_err(|err| IngestError::Filesystem(err.to_string()))?;
        source.fetch(&name, &mut temp)?;
        temp.seek(SeekFrom::Start(0))
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;

        let reader = BufReader::new(MultiGzDecoder::new(temp));
        let pairs = RecordScanner::new().scan(reader, |pair| {
            writeln!(out, "{pair}").map_err(|err| IngestError::Output(err.to_string()))
        })?;
        info!(member = %name, pairs, "scanned archive member");
        summary.members += 1;
        summary.pairs += pairs;
    }
    out.flush().map_err(|err| IngestError::Output(err.to_string()))?;
    Ok(summary)
}

fn ftp_error(err: suppaftp::FtpError) -> IngestError {
    IngestError::ArchiveTransfer(err.to_string())
}
