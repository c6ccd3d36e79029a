use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use pharmit_ingest::config::{Config, ConfigLoader, ConformerParams, load_prefixes};
use pharmit_ingest::error::IngestError;

#[test]
fn invalid_prefixes_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let good = temp.path().join("mount-a");
    fs::create_dir(&good).unwrap();
    let list = temp.path().join("prefixes.txt");
    fs::write(
        &list,
        format!("{}\n\n{}\n", good.display(), temp.path().join("missing").display()),
    )
    .unwrap();

    let prefixes = load_prefixes(&list).unwrap();
    assert_eq!(prefixes, vec![Utf8PathBuf::from_path_buf(good).unwrap()]);
}

#[test]
fn no_valid_prefix_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let list = temp.path().join("prefixes.txt");
    fs::write(&list, "/definitely/not/here\n").unwrap();
    assert_matches!(load_prefixes(&list), Err(IngestError::NoPrefixes));

    let missing = temp.path().join("absent.txt");
    assert_matches!(load_prefixes(&missing), Err(IngestError::PrefixRead(path)) if path == missing);
}

#[test]
fn config_file_overrides_database() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("pharmit-ingest.json");
    fs::write(
        &path,
        r#"{ "schema_version": 1, "database": "/srv/pharmit/confs.db", "toolkit_dir": "/opt/obabel/bin" }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.database, Utf8PathBuf::from("/srv/pharmit/confs.db"));
    assert_eq!(
        resolved.toolkit_dir.as_deref(),
        Some(std::path::Path::new("/opt/obabel/bin"))
    );
}

#[test]
fn broken_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ database: ").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(IngestError::ConfigParse(_))
    );

    let missing = temp.path().join("missing.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(IngestError::ConfigRead(_))
    );
}

#[test]
fn unknown_schema_version_is_rejected() {
    let config = Config {
        schema_version: Some(2),
        database: Some("/tmp/confs.db".to_string()),
        toolkit_dir: None,
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(IngestError::ConfigParse(message)) if message.contains("schema_version 2")
    );
}

#[test]
fn negative_window_is_invalid() {
    let params = ConformerParams {
        energy_window: -1.0,
        ..ConformerParams::default()
    };
    assert_matches!(params.validate(), Err(IngestError::InvalidParameter(_)));
    assert!(ConformerParams::default().validate().is_ok());
}
