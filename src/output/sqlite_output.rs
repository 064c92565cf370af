//! SQLite output
//!
//! Every printed record becomes one row of the `linksdb` table. Rows are
//! inserted inside a single transaction that is committed when the run
//! ends.

use crate::checker::UrlRecord;
use crate::output::stats::CheckStatistics;
use crate::output::traits::{OutputResult, ResultSink};
use rusqlite::{params, Connection};
use std::path::Path;

/// SQL schema for the results table
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS linksdb (
    urlname TEXT NOT NULL,
    parentname TEXT,
    baseref TEXT,
    valid INTEGER NOT NULL,
    result TEXT NOT NULL,
    warning TEXT,
    info TEXT,
    url TEXT,
    line INTEGER,
    col INTEGER,
    name TEXT,
    checktime REAL,
    dltime REAL,
    size INTEGER,
    cached INTEGER NOT NULL,
    level INTEGER NOT NULL,
    modified TEXT
);
"#;

/// SQLite sink
pub struct SqlLogger {
    conn: Connection,
    in_transaction: bool,
}

impl SqlLogger {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqlLogger)` - Database opened and schema created
    /// * `Err(OutputError)` - Failed to open database
    pub fn open(path: &Path) -> OutputResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> OutputResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> OutputResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    fn insert(&self, record: &UrlRecord) -> OutputResult<()> {
        let warnings: Vec<String> = record
            .warnings
            .iter()
            .map(|w| format!("[{}] {}", w.tag, w.message))
            .collect();

        self.conn.execute(
            "INSERT INTO linksdb (urlname, parentname, baseref, valid, result, warning, info, \
             url, line, col, name, checktime, dltime, size, cached, level, modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                record.base_url,
                record.parent_url,
                record.base_ref,
                record.valid,
                record.result,
                warnings.join("\n"),
                record.info.join("\n"),
                record.url,
                record.line as i64,
                record.column as i64,
                record.name,
                record.checktime.as_secs_f64(),
                record.dltime.map(|d| d.as_secs_f64()),
                record.size.map(|s| s as i64),
                record.cached,
                record.recursion_level,
                record.modified.map(|m| m.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn count_rows(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM linksdb", [], |row| row.get(0))
            .unwrap()
    }
}

impl ResultSink for SqlLogger {
    fn name(&self) -> &str {
        "sql"
    }

    fn start_output(&mut self) -> OutputResult<()> {
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn log_filter_url(&mut self, record: &UrlRecord, do_print: bool) -> OutputResult<()> {
        if do_print {
            self.insert(record)?;
        }
        Ok(())
    }

    fn end_output(&mut self, _stats: &CheckStatistics) -> OutputResult<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}
