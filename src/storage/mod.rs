// src/storage/mod.rs
//! SQLite result-set store: one table per [`ResultSetKey`].
//!
//! A `ResultSetStore` owns a single `rusqlite::Connection`, which is not
//! `Sync`; concurrent workers each open their own store on the same file.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::models::{FilingRecord, ResultSetKey, WriteMode};
use crate::utils::error::StorageError;

// Concurrent writers wait on each other instead of failing with SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const COLUMNS: &str = "row_index, identifier, security_name, announcement_date, announcement_title, \
     document_url, document_format, document_size_bytes, info_type_code, market_code, extra, \
     document_content, document_text";

pub struct ResultSetStore {
    conn: Connection,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            row_index INTEGER NOT NULL,
            identifier TEXT NOT NULL,
            security_name TEXT NOT NULL,
            announcement_date TEXT,
            announcement_title TEXT NOT NULL,
            document_url TEXT NOT NULL,
            document_format TEXT NOT NULL,
            document_size_bytes INTEGER,
            info_type_code TEXT NOT NULL,
            market_code TEXT NOT NULL,
            extra TEXT NOT NULL,
            document_content BLOB,
            document_text TEXT
        )",
        quote_ident(table)
    )
}

impl ResultSetStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();

        // Ensure directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        tracing::debug!("Opened result-set store at {}", path.display());
        Ok(Self { conn })
    }

    /// Names of every table currently in the database.
    pub fn list_result_sets(&self) -> Result<HashSet<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Writes `records` under `key`. `Replace` drops any previous table
    /// first; both modes commit atomically.
    pub fn write_result_set(
        &mut self,
        key: &ResultSetKey,
        records: &[FilingRecord],
        mode: WriteMode,
    ) -> Result<usize, StorageError> {
        let table = key.table_name();
        let tx = self.conn.transaction()?;

        if mode == WriteMode::Replace {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;
        }
        tx.execute_batch(&create_table_sql(&table))?;

        let start_index: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&table)),
            [],
            |row| row.get(0),
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                quote_ident(&table),
                COLUMNS
            ))?;
            for (offset, record) in records.iter().enumerate() {
                let extra = serde_json::to_string(&record.extra)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                stmt.execute(params![
                    start_index + offset as i64,
                    record.identifier,
                    record.security_name,
                    record.announcement_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    record.announcement_title,
                    record.document_url,
                    record.document_format,
                    record.document_size_bytes.map(|n| n as i64),
                    record.info_type_code,
                    record.market_code,
                    extra,
                    record.document_content,
                    record.document_text,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Wrote {} rows to {} ({:?})", records.len(), table, mode);
        Ok(records.len())
    }

    /// Reads a persisted result set back in row order.
    pub fn read_result_set(&self, table: &str) -> Result<Vec<FilingRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY row_index",
            COLUMNS,
            quote_ident(table)
        ))?;
        let rows = stmt.query_map([], |row| {
            let date: Option<String> = row.get(3)?;
            let size: Option<i64> = row.get(7)?;
            let extra: String = row.get(10)?;
            Ok((
                FilingRecord {
                    identifier: row.get(1)?,
                    security_name: row.get(2)?,
                    announcement_date: date
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                    announcement_title: row.get(4)?,
                    document_url: row.get(5)?,
                    document_format: row.get(6)?,
                    document_size_bytes: size.map(|n| n as u64),
                    info_type_code: row.get(8)?,
                    market_code: row.get(9)?,
                    extra: BTreeMap::new(),
                    document_content: row.get(11)?,
                    document_text: row.get(12)?,
                },
                extra,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (mut record, extra) = row?;
            record.extra = serde_json::from_str(&extra)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilingQuery;
    use tempfile::tempdir;

    fn key(identifier: &str) -> ResultSetKey {
        let query = FilingQuery {
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            doc_type: "all".to_string(),
            ascending: false,
        };
        ResultSetKey::new(identifier, "hkexnews", &query)
    }

    fn record(title: &str) -> FilingRecord {
        let mut extra = BTreeMap::new();
        extra.insert("NEWS_ID".to_string(), "42".to_string());
        FilingRecord {
            identifier: "00700".to_string(),
            security_name: "TENCENT".to_string(),
            announcement_date: NaiveDate::from_ymd_opt(2020, 4, 1),
            announcement_title: title.to_string(),
            document_url: "https://example.com/a.pdf".to_string(),
            document_format: "PDF".to_string(),
            document_size_bytes: Some(1024),
            info_type_code: "40100".to_string(),
            market_code: "SEHK".to_string(),
            extra,
            document_content: Some(vec![1, 2, 3]),
            document_text: None,
        }
    }

    #[test]
    fn lists_written_tables() {
        let dir = tempdir().unwrap();
        let mut store = ResultSetStore::open(dir.path().join("test.db")).unwrap();
        assert!(store.list_result_sets().unwrap().is_empty());

        store.write_result_set(&key("0700"), &[record("a")], WriteMode::Replace).unwrap();
        let names = store.list_result_sets().unwrap();
        assert!(names.contains("0700_hkexnews_20200101_20201231_all"));
    }

    #[test]
    fn replace_overwrites_and_append_extends() {
        let dir = tempdir().unwrap();
        let mut store = ResultSetStore::open(dir.path().join("test.db")).unwrap();
        let k = key("0005");

        store.write_result_set(&k, &[record("a"), record("b")], WriteMode::Replace).unwrap();
        store.write_result_set(&k, &[record("c")], WriteMode::Replace).unwrap();
        let rows = store.read_result_set(&k.table_name()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].announcement_title, "c");

        store.write_result_set(&k, &[record("d")], WriteMode::Append).unwrap();
        let rows = store.read_result_set(&k.table_name()).unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.announcement_title.as_str()).collect();
        assert_eq!(titles, ["c", "d"]);
    }

    #[test]
    fn round_trips_content_and_extension_fields() {
        let dir = tempdir().unwrap();
        let mut store = ResultSetStore::open(dir.path().join("nested/dir/test.db")).unwrap();
        let original = record("annual report");
        store.write_result_set(&key("0700"), &[original.clone()], WriteMode::Replace).unwrap();
        let rows = store.read_result_set(&key("0700").table_name()).unwrap();
        assert_eq!(rows, vec![original]);
    }
}
