use camino::Utf8PathBuf;

use pharmit_ingest::domain::CanonicalSmiles;
use pharmit_ingest::store::{ConformerStore, SqliteConnector, StoreConnector};

fn canonical(value: &str) -> CanonicalSmiles {
    CanonicalSmiles::new(value.to_string(), "test").unwrap()
}

fn connector(temp: &tempfile::TempDir) -> SqliteConnector {
    let path = Utf8PathBuf::from_path_buf(temp.path().join("db").join("conformers.db")).unwrap();
    SqliteConnector::new(path)
}

#[test]
fn duplicate_name_is_a_no_op() {
    let temp = tempfile::tempdir().unwrap();
    let connector = connector(&temp);
    let mut store = connector.connect().unwrap();

    let smiles = canonical("CCO");
    let first = store.register(&smiles, 46.0419, "ethanol").unwrap();
    let again = store.register(&smiles, 46.0419, "ethanol").unwrap();
    let alias = store.register(&smiles, 46.0419, "alcohol").unwrap();

    assert!(first.is_new);
    assert!(!again.is_new);
    assert_eq!(first.id, alias.id);
    assert_eq!(store.names(&smiles).unwrap(), vec!["alcohol", "ethanol"]);
}

#[test]
fn connections_share_one_database() {
    let temp = tempfile::tempdir().unwrap();
    let connector = connector(&temp);
    let mut writer = connector.connect().unwrap();
    let ethanol = writer.register(&canonical("CCO"), 46.0, "ethanol").unwrap();
    let amine = writer.register(&canonical("CCN"), 45.0, "ethylamine").unwrap();
    assert_ne!(ethanol.id, amine.id);

    let mut reader = connector.connect().unwrap();
    let seen = reader.register(&canonical("CCN"), 45.0, "aminoethane").unwrap();
    assert!(!seen.is_new);
    assert_eq!(seen.id, amine.id);

    let record = reader.compound(ethanol.id).unwrap().unwrap();
    assert_eq!(record.smiles, "CCO");
    assert_eq!(record.conformers, None);
    assert_eq!(record.path, None);
}
