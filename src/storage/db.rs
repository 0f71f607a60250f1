use redb::{
    Database as RedbDatabase, ReadTransaction, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;
use crate::vector::VectorCodecError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Corrupt face vector: {0}")]
    Vector(#[from] VectorCodecError),
}

/// `From` impls for the boxed redb error variants
macro_rules! boxed_redb_error {
    ($($source:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<redb::$source> for DatabaseError {
                fn from(e: redb::$source) -> Self {
                    DatabaseError::$variant(Box::new(e))
                }
            }
        )*
    };
}

boxed_redb_error! {
    CommitError => Commit,
    DatabaseError => RedbDatabase,
    Error => Redb,
    StorageError => Storage,
    TableError => Table,
    TransactionError => Transaction,
}

/// Handle to the embedded database. Cloning shares the same underlying file;
/// every operation opens and closes its own transaction.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub statuses: u64,
    pub images: u64,
    pub feature_mappings: u64,
    pub matches: u64,
    pub queued_messages: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("face-match.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IMAGE_STATUSES)?;
            let _ = write_txn.open_table(IMAGES)?;
            let _ = write_txn.open_table(FEATURE_MAPPINGS)?;
            let _ = write_txn.open_table(MATCHES)?;
            let _ = write_txn.open_table(LOCAL_QUEUE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction. redb serializes writers, so a read-check-write
    /// inside one of these is atomic with respect to every other writer.
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Empty every table. Only reachable through the test-mode purge route.
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stats = PurgeStats {
            statuses: clear_table(&write_txn, IMAGE_STATUSES)?,
            images: clear_table(&write_txn, IMAGES)?,
            feature_mappings: clear_table(&write_txn, FEATURE_MAPPINGS)?,
            matches: clear_table(&write_txn, MATCHES)?,
            queued_messages: clear_table(&write_txn, LOCAL_QUEUE)?,
        };
        write_txn.commit()?;
        Ok(stats)
    }
}

/// Drop and recreate a table, returning how many rows it held.
fn clear_table<K: redb::Key + 'static, V: redb::Value + 'static>(
    write_txn: &WriteTransaction,
    definition: TableDefinition<K, V>,
) -> Result<u64, DatabaseError> {
    let count = write_txn.open_table(definition)?.len()?;
    write_txn.delete_table(definition)?;
    let _ = write_txn.open_table(definition)?;
    Ok(count)
}
