//! an archive in a single sqlite file
use crate::error::Result;
use bif::archive::{Archive, ArchivePath};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::{path::Path, sync::Arc};
use tracing::debug;

/// Stores every object as a row of the `objects` table, keyed by its `/` joined path
#[derive(Clone)]
pub struct SqliteArchive(Arc<Mutex<Connection>>);

impl SqliteArchive {
    /// Opens or creates the archive file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        debug!("opening sqlite archive {}", path.as_ref().display());
        Self::init(Connection::open(path)?)
    }

    /// An archive that lives only as long as the process
    pub fn memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS objects (path TEXT PRIMARY KEY, content BLOB NOT NULL);",
        )?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    fn key(path: &ArchivePath) -> String {
        path.segments().join("/")
    }

    /// all keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.0.lock();
        let mut stmt = conn.prepare("SELECT path FROM objects ORDER BY path")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

impl Archive for SqliteArchive {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> bif::Result<()> {
        self.0
            .lock()
            .execute(
                "INSERT OR REPLACE INTO objects (path, content) VALUES (?1, ?2)",
                params![Self::key(path), content],
            )
            .map_err(bif::Error::storage)?;
        Ok(())
    }

    fn remove(&self, path: &ArchivePath) -> bif::Result<()> {
        self.0
            .lock()
            .execute("DELETE FROM objects WHERE path = ?1", params![Self::key(path)])
            .map_err(bif::Error::storage)?;
        Ok(())
    }

    fn read(&self, path: &ArchivePath) -> bif::Result<Vec<u8>> {
        self.0
            .lock()
            .query_row(
                "SELECT content FROM objects WHERE path = ?1",
                params![Self::key(path)],
                |row| row.get(0),
            )
            .optional()
            .map_err(bif::Error::storage)?
            .ok_or_else(|| bif::Error::ObjectNotFound(path.clone()))
    }
}
