use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("missing name for input line: {0}")]
    MissingName(String),

    #[error("failed to parse structure {smiles}: {message}")]
    StructureParse { smiles: String, message: String },

    #[error("canonical structure too large ({len} characters): {name}")]
    OversizedStructure { name: String, len: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read prefix file at {0}")]
    PrefixRead(PathBuf),

    #[error("no valid prefixes provided")]
    #[diagnostic(help("list one existing directory per line in the prefix file"))]
    NoPrefixes,

    #[error("failed to read input file at {0}")]
    InputRead(PathBuf),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("toolkit command failed: {0}")]
    Toolkit(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("archive transfer failed: {0}")]
    ArchiveTransfer(String),

    #[error("failed to write output: {0}")]
    Output(String),
}
