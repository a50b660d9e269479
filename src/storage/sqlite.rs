//! SQLite-backed program store

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::ProgramStore;
use crate::error::{Error, Result};
use crate::models::ProgramEntry;
use crate::utils::{format_date, parse_date};

/// Program store in a single SQLite database
///
/// The connection sits behind a mutex; every statement runs on the blocking
/// thread pool so the async runtime is never stalled by disk I/O.
#[derive(Debug, Clone)]
pub struct SqliteProgramStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgramStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS program_table (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                station_name TEXT NOT NULL,
                air_date TEXT NOT NULL,
                air_time TEXT NOT NULL,
                program TEXT NOT NULL,
                week INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_program_table_station_date
                ON program_table(station_name, air_date);",
        )?;
        Ok(())
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut *conn)
        })
        .await
        .map_err(|e| Error::storage(format!("sqlite worker failed: {e}")))?
    }
}

#[async_trait]
impl ProgramStore for SqliteProgramStore {
    async fn exists(&self, station_name: &str, date: NaiveDate) -> Result<bool> {
        let station = station_name.to_string();
        let day = format_date(date);
        self.run(move |conn| {
            let found = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM program_table WHERE station_name = ?1 AND air_date = ?2)",
                params![station, day],
                |row| row.get::<_, bool>(0),
            )?;
            Ok(found)
        })
        .await
    }

    async fn get(&self, station_name: &str, date: NaiveDate) -> Result<Vec<ProgramEntry>> {
        let station = station_name.to_string();
        let day = format_date(date);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT station_name, air_date, air_time, program, week FROM program_table
                 WHERE station_name = ?1 AND air_date = ?2 ORDER BY air_time, id",
            )?;
            let rows = stmt.query_map(params![station, day], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u8>(4)?,
                ))
            })?;

            let mut entries = Vec::new();
            for row in rows {
                let (station_name, air_date, air_time, program, week) = row?;
                let air_date = parse_date(&air_date)
                    .ok_or_else(|| Error::storage(format!("corrupt air_date '{air_date}'")))?;
                entries.push(ProgramEntry {
                    station_name,
                    air_date,
                    air_time,
                    program,
                    week,
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn save(
        &self,
        station_name: &str,
        date: NaiveDate,
        entries: &[ProgramEntry],
    ) -> Result<()> {
        let station = station_name.to_string();
        let day = format_date(date);
        let entries = entries.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM program_table WHERE station_name = ?1 AND air_date = ?2",
                params![station, day],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO program_table (station_name, air_date, air_time, program, week)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for entry in &entries {
                    insert.execute(params![
                        station,
                        day,
                        entry.air_time,
                        entry.program,
                        entry.week
                    ])?;
                }
            }
            tx.commit()?;
            tracing::debug!(station = %station, date = %day, count = entries.len(), "Program table saved");
            Ok(())
        })
        .await
    }
}
