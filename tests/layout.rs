use camino::{Utf8Path, Utf8PathBuf};

use pharmit_ingest::domain::CompoundId;
use pharmit_ingest::error::IngestError;
use pharmit_ingest::layout::{Partitioning, PrefixRing, ensure_dir};

#[test]
fn partition_divides_id() {
    let partitioning = Partitioning::new(10_000);
    let prefix = Utf8Path::new("/data/a");
    for (id, bucket) in [(1, 0), (9_999, 0), (10_000, 1), (123_456, 12)] {
        let id = CompoundId::new(id);
        assert_eq!(partitioning.bucket(id), Some(bucket));
        assert_eq!(
            partitioning.file_path(prefix, id),
            Utf8PathBuf::from(format!("/data/a/{bucket}/{id}.sdf.gz"))
        );
    }
}

#[test]
fn zero_modulus_writes_under_prefix() {
    let partitioning = Partitioning::new(0);
    assert!(!partitioning.is_enabled());
    assert_eq!(partitioning.bucket(CompoundId::new(42)), None);
    assert_eq!(
        partitioning.file_path(Utf8Path::new("/data/a"), CompoundId::new(42)),
        Utf8PathBuf::from("/data/a/42.sdf.gz")
    );
}

#[test]
fn prefixes_cycle_in_order() {
    let mut ring = PrefixRing::new(vec![
        Utf8PathBuf::from("/a"),
        Utf8PathBuf::from("/b"),
        Utf8PathBuf::from("/c"),
    ])
    .unwrap();
    let picked: Vec<String> = (0..7).map(|_| ring.next_prefix().to_string()).collect();
    assert_eq!(picked, vec!["/a", "/b", "/c", "/a", "/b", "/c", "/a"]);
}

#[test]
fn empty_ring_is_rejected() {
    assert!(matches!(PrefixRing::new(Vec::new()), Err(IngestError::NoPrefixes)));
}

#[test]
fn ensure_dir_tolerates_existing() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("3").join("nested")).unwrap();
    ensure_dir(&dir).unwrap();
    ensure_dir(&dir).unwrap();
    assert!(dir.as_std_path().is_dir());
}
