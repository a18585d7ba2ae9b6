// src/db/mod.rs

//! SQLite storage for profile revisions
//!
//! `init` creates and migrates a database, `open` opens an existing one, and
//! `transaction` runs a closure inside a transaction that commits on `Ok`
//! and rolls back on `Err`.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::info;

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Create (if needed) and migrate the database at `db_path`
pub fn init(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    info!("Initializing profile database at {}", db_path);
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an existing database, migrating it if its schema is old
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::NotFoundError(format!(
            "database {} does not exist (run `provisioner profile create` first)",
            db_path
        )));
    }
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// In-memory database with the current schema
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run `f` inside a transaction
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/profiles.db");
        let path = path.to_str().unwrap();
        init(path).unwrap();
        let conn = open(path).unwrap();
        assert_eq!(schema::get_schema_version(&conn).unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_open_missing_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.db");
        assert!(matches!(
            open(path.to_str().unwrap()),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut conn = open_in_memory().unwrap();
        let result: Result<()> = transaction(&mut conn, |tx| {
            tx.execute("INSERT INTO profiles (id) VALUES ('p')", [])?;
            Err(Error::InitError("boom".to_string()))
        });
        assert!(result.is_err());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
