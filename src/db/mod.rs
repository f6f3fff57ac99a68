use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::PathBuf;

use crate::models::{ProcessingLog, SubmissionRecord};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(db_path: PathBuf) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_settings.sql",
                include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/001_create_settings.sql")),
            ),
            (
                "002_create_processing_logs.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_processing_logs.sql"
                )),
            ),
            (
                "003_create_submissions.sql",
                include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/003_create_submissions.sql")),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> SqlResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0)).optional()
    }

    pub fn clear_setting(&self, key: &str) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn log_processing(
        &self,
        receipt_id: Option<&str>,
        image_hash: Option<&str>,
        process_type: &str,
        status: &str,
        message: Option<&str>,
    ) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO processing_logs (id, receipt_id, image_hash, process_type, status, message, created_at)
             VALUES (hex(randomblob(16)), ?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![receipt_id, image_hash, process_type, status, message],
        )?;
        Ok(())
    }

    pub fn get_processing_logs(&self, receipt_id: &str) -> SqlResult<Vec<ProcessingLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT receipt_id, image_hash, process_type, status, message, created_at
             FROM processing_logs WHERE receipt_id = ?1
             ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![receipt_id], |row| {
            Ok(ProcessingLog {
                receipt_id: row.get(0)?,
                image_hash: row.get(1)?,
                process_type: row.get(2)?,
                status: row.get(3)?,
                message: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        rows.collect()
    }

    pub fn record_submission(
        &self,
        title: &str,
        grand_total: &str,
        receipt_count: usize,
        payload_json: &str,
    ) -> SqlResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO submissions (id, title, grand_total, receipt_count, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![id, title, grand_total, receipt_count as i64, payload_json],
        )?;
        Ok(id)
    }

    pub fn get_submissions(&self, limit: usize) -> SqlResult<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, grand_total, receipt_count, payload_json, created_at
             FROM submissions
             ORDER BY rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(SubmissionRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                grand_total: row.get(2)?,
                receipt_count: row.get::<_, i64>(3)? as usize,
                payload_json: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        rows.collect()
    }
}
