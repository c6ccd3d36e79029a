use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::CompoundId;
use crate::error::IngestError;

/// Groups sequential compound ids into `id / modulus` bucket directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioning {
    modulus: i64,
}

impl Partitioning {
    /// A modulus of zero disables bucketing.
    pub fn new(modulus: u64) -> Self {
        Self {
            modulus: i64::try_from(modulus).unwrap_or(i64::MAX),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.modulus > 0
    }

    pub fn bucket(&self, id: CompoundId) -> Option<i64> {
        self.is_enabled().then(|| id.get().div_euclid(self.modulus))
    }

    pub fn directory(&self, prefix: &Utf8Path, id: CompoundId) -> Utf8PathBuf {
        match self.bucket(id) {
            Some(bucket) => prefix.join(bucket.to_string()),
            None => prefix.to_path_buf(),
        }
    }

    pub fn file_path(&self, prefix: &Utf8Path, id: CompoundId) -> Utf8PathBuf {
        self.directory(prefix, id).join(format!("{id}.sdf.gz"))
    }
}

/// Round-robin over storage roots so consecutive compounds land on
/// different mounts.
#[derive(Debug, Clone)]
pub struct PrefixRing {
    prefixes: Vec<Utf8PathBuf>,
    next: usize,
}

impl PrefixRing {
    pub fn new(prefixes: Vec<Utf8PathBuf>) -> Result<Self, IngestError> {
        if prefixes.is_empty() {
            return Err(IngestError::NoPrefixes);
        }
        Ok(Self { prefixes, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn next_prefix(&mut self) -> Utf8PathBuf {
        let prefix = self.prefixes[self.next].clone();
        self.next = (self.next + 1) % self.prefixes.len();
        prefix
    }
}

/// Creates `dir` and its parents; an existing directory, including one a
/// concurrent worker just created, is success.
pub fn ensure_dir(dir: &Utf8Path) -> Result<(), IngestError> {
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("create {dir}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        let layout = Partitioning::new(10_000);
        assert_eq!(layout.bucket(CompoundId::new(0)), Some(0));
        assert_eq!(layout.bucket(CompoundId::new(9_999)), Some(0));
        assert_eq!(layout.bucket(CompoundId::new(10_000)), Some(1));
        assert_eq!(layout.bucket(CompoundId::new(19_999)), Some(1));
        assert_eq!(layout.bucket(CompoundId::new(20_000)), Some(2));
    }

    #[test]
    fn unpartitioned_path() {
        let layout = Partitioning::new(0);
        let path = layout.file_path(Utf8Path::new("/data/confs"), CompoundId::new(42));
        assert_eq!(path, Utf8PathBuf::from("/data/confs/42.sdf.gz"));
    }

    #[test]
    fn ring_requires_prefix() {
        assert!(PrefixRing::new(Vec::new()).is_err());
    }
}
