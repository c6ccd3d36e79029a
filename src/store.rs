use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;

use crate::domain::{CanonicalSmiles, CompoundId, Registration};
use crate::error::IngestError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS structures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    smile TEXT NOT NULL UNIQUE,
    weight REAL NOT NULL,
    nconfs INTEGER,
    sdfloc TEXT
);
CREATE TABLE IF NOT EXISTS names (
    smile TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (smile, name)
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundRecord {
    pub id: CompoundId,
    pub smiles: String,
    pub weight: f64,
    pub conformers: Option<usize>,
    pub path: Option<String>,
}

pub trait ConformerStore {
    /// Resolves the id of `canonical`, inserting it when unseen, and records
    /// `name` for it. Re-registering a known name is a no-op.
    fn register(
        &mut self,
        canonical: &CanonicalSmiles,
        weight: f64,
        name: &str,
    ) -> Result<Registration, IngestError>;

    /// Returns false when no row matched both `id` and `canonical`.
    fn record_conformers(
        &mut self,
        id: CompoundId,
        canonical: &CanonicalSmiles,
        count: usize,
        path: &Utf8Path,
    ) -> Result<bool, IngestError>;

    fn compound(&self, id: CompoundId) -> Result<Option<CompoundRecord>, IngestError>;

    fn names(&self, canonical: &CanonicalSmiles) -> Result<Vec<String>, IngestError>;
}

/// Hands out independent store handles; each worker job takes its own and
/// drops it when done.
pub trait StoreConnector: Send + Sync {
    type Store: ConformerStore;

    fn connect(&self) -> Result<Self::Store, IngestError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path()).map_err(store_error)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(store_error)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory().map_err(store_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, IngestError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(store_error)?;
        conn.execute_batch(SCHEMA).map_err(store_error)?;
        Ok(Self { conn })
    }
}

impl ConformerStore for SqliteStore {
    fn register(
        &mut self,
        canonical: &CanonicalSmiles,
        weight: f64,
        name: &str,
    ) -> Result<Registration, IngestError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO structures (smile, weight) VALUES (?1, ?2)",
                params![canonical.as_str(), weight],
            )
            .map_err(store_error)?;
        let id: i64 = tx
            .query_row(
                "SELECT id FROM structures WHERE smile = ?1",
                params![canonical.as_str()],
                |row| row.get(0),
            )
            .map_err(store_error)?;
        tx.execute(
            "INSERT OR IGNORE INTO names (smile, name) VALUES (?1, ?2)",
            params![canonical.as_str(), name],
        )
        .map_err(store_error)?;
        tx.commit().map_err(store_error)?;

        Ok(Registration {
            id: CompoundId::new(id),
            is_new: inserted == 1,
        })
    }

    fn record_conformers(
        &mut self,
        id: CompoundId,
        canonical: &CanonicalSmiles,
        count: usize,
        path: &Utf8Path,
    ) -> Result<bool, IngestError> {
        let count = i64::try_from(count)
            .map_err(|_| IngestError::Store(format!("conformer count {count} out of range")))?;
        let updated = self
            .conn
            .execute(
                "UPDATE structures SET nconfs = ?1, sdfloc = ?2 WHERE id = ?3 AND smile = ?4",
                params![count, path.as_str(), id.get(), canonical.as_str()],
            )
            .map_err(store_error)?;
        Ok(updated > 0)
    }

    fn compound(&self, id: CompoundId) -> Result<Option<CompoundRecord>, IngestError> {
        self.conn
            .query_row(
                "SELECT id, smile, weight, nconfs, sdfloc FROM structures WHERE id = ?1",
                params![id.get()],
                |row| {
                    let conformers: Option<i64> = row.get(3)?;
                    Ok(CompoundRecord {
                        id: CompoundId::new(row.get(0)?),
                        smiles: row.get(1)?,
                        weight: row.get(2)?,
                        conformers: conformers.and_then(|count| usize::try_from(count).ok()),
                        path: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(store_error)
    }

    fn names(&self, canonical: &CanonicalSmiles) -> Result<Vec<String>, IngestError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM names WHERE smile = ?1 ORDER BY name")
            .map_err(store_error)?;
        let rows = stmt
            .query_map(params![canonical.as_str()], |row| row.get::<_, String>(0))
            .map_err(store_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_error)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: Utf8PathBuf,
}

impl SqliteConnector {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl StoreConnector for SqliteConnector {
    type Store = SqliteStore;

    fn connect(&self) -> Result<SqliteStore, IngestError> {
        SqliteStore::open(&self.path)
    }
}

fn store_error(err: rusqlite::Error) -> IngestError {
    IngestError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(value: &str) -> CanonicalSmiles {
        CanonicalSmiles::new(value.to_string(), "test").unwrap()
    }

    #[test]
    fn register_assigns_id_once() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.register(&canonical("CCO"), 46.04, "ethanol").unwrap();
        let second = store.register(&canonical("CCO"), 46.04, "alcohol").unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn record_conformers_requires_matching_smiles() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let reg = store.register(&canonical("CCO"), 46.04, "ethanol").unwrap();
        let path = Utf8Path::new("/data/0/1.sdf.gz");
        assert!(!store
            .record_conformers(reg.id, &canonical("CCN"), 3, path)
            .unwrap());
        assert!(store
            .record_conformers(reg.id, &canonical("CCO"), 3, path)
            .unwrap());
        let record = store.compound(reg.id).unwrap().unwrap();
        assert_eq!(record.conformers, Some(3));
        assert_eq!(record.path.as_deref(), Some("/data/0/1.sdf.gz"));
    }
}
