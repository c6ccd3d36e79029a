use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Canonical strings longer than this are degenerate or polymeric inputs.
pub const MAX_CANONICAL_LEN: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompoundId(i64);

impl CompoundId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CompoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CompoundId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalSmiles(String);

impl CanonicalSmiles {
    /// Wraps toolkit output, rejecting structures over [`MAX_CANONICAL_LEN`].
    /// `name` is only used to label the error.
    pub fn new(value: String, name: &str) -> Result<Self, IngestError> {
        if value.len() > MAX_CANONICAL_LEN {
            return Err(IngestError::OversizedStructure {
                name: name.to_string(),
                len: value.len(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalSmiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of the ingestion input: `<smiles> <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub smiles: String,
    pub name: String,
}

impl FromStr for InputRecord {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (smiles, name) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| IngestError::MissingName(trimmed.to_string()))?;
        let name = name.trim();
        if smiles.is_empty() || name.is_empty() {
            return Err(IngestError::MissingName(trimmed.to_string()));
        }
        Ok(Self {
            smiles: smiles.to_string(),
            name: name.to_string(),
        })
    }
}

/// Picks the longest period-separated component; salts and counter-ions are
/// dropped. The first of equally long components wins.
pub fn parent_component(smiles: &str) -> &str {
    smiles
        .split('.')
        .rev()
        .max_by_key(|component| component.len())
        .unwrap_or(smiles)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub id: CompoundId,
    pub is_new: bool,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parent_component_strips_salt() {
        assert_eq!(parent_component("CCO.Cl"), "CCO");
        assert_eq!(parent_component("[Na+].CC(=O)[O-]"), "CC(=O)[O-]");
    }

    #[test]
    fn parent_component_prefers_first_on_ties() {
        assert_eq!(parent_component("CO.OC"), "CO");
    }

    #[test]
    fn input_record_keeps_spaces_in_name() {
        let record: InputRecord = "c1ccccc1  benzene ring  \n".parse().unwrap();
        assert_eq!(record.smiles, "c1ccccc1");
        assert_eq!(record.name, "benzene ring");
    }

    #[test]
    fn input_record_requires_name() {
        let err = "CCO   ".parse::<InputRecord>().unwrap_err();
        assert_matches!(err, IngestError::MissingName(_));
    }

    #[test]
    fn canonical_length_ceiling() {
        assert!(CanonicalSmiles::new("C".repeat(MAX_CANONICAL_LEN), "ok").is_ok());
        let err = CanonicalSmiles::new("C".repeat(MAX_CANONICAL_LEN + 1), "big").unwrap_err();
        assert_matches!(err, IngestError::OversizedStructure { len: 251, .. });
    }
}
