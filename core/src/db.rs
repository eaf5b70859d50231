use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{NewSleepLog, SleepLog, User};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    is_public INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sleep_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    sleep_date TEXT NOT NULL,
                    sleep_score REAL NOT NULL,
                    bed_time TEXT NOT NULL,
                    wakeup_time TEXT NOT NULL,
                    sleep_duration INTEGER NOT NULL,
                    wakeup_count INTEGER NOT NULL,
                    deep_sleep_continuity REAL NOT NULL,
                    deep_sleep_percentage REAL NOT NULL,
                    light_sleep_percentage REAL NOT NULL,
                    rem_sleep_percentage REAL NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, sleep_date)
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sleep_logs_user_date
                    ON sleep_logs(user_id, sleep_date);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn sleep_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<SleepLog> {
        Ok(SleepLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            sleep_date: row.get(2)?,
            sleep_score: row.get(3)?,
            bed_time: row.get(4)?,
            wakeup_time: row.get(5)?,
            sleep_duration: row.get(6)?,
            wakeup_count: row.get(7)?,
            deep_sleep_continuity: row.get(8)?,
            deep_sleep_percentage: row.get(9)?,
            light_sleep_percentage: row.get(10)?,
            rem_sleep_percentage: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            is_public: row.get::<_, i64>(3)? != 0,
            created_at: row.get(4)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user_by_id(id)?.context("User not found after insert")
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, is_public, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, is_public, created_at FROM users WHERE username = ?1",
                params![username],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, is_public, created_at FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn set_user_public(&self, id: i64, is_public: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET is_public = ?1 WHERE id = ?2",
            params![i64::from(is_public), id],
        )?;
        Ok(rows > 0)
    }

    // --- Sessions ---

    pub fn create_session(&self, token: &str, user_id: i64, expires_at: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now, expires_at],
        )?;
        Ok(())
    }

    /// Resolve a bearer token to its user, ignoring expired sessions.
    /// `now` is an RFC 3339 UTC timestamp (string comparison is sufficient
    /// because both sides are UTC).
    pub fn get_session_user(&self, token: &str, now: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.password_hash, u.is_public, u.created_at
                 FROM sessions s JOIN users u ON s.user_id = u.id
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, now],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_expired_sessions(&self, now: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
        Ok(rows)
    }

    // --- Sleep logs ---

    pub fn insert_sleep_log(&self, user_id: i64, log: &NewSleepLog) -> Result<SleepLog> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sleep_logs (
                user_id, sleep_date, sleep_score, bed_time, wakeup_time,
                sleep_duration, wakeup_count, deep_sleep_continuity,
                deep_sleep_percentage, light_sleep_percentage, rem_sleep_percentage,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user_id,
                log.sleep_date,
                log.sleep_score,
                log.bed_time,
                log.wakeup_time,
                log.sleep_duration,
                log.wakeup_count,
                log.deep_sleep_continuity,
                log.deep_sleep_percentage,
                log.light_sleep_percentage,
                log.rem_sleep_percentage,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_sleep_log(user_id, id)?
            .context("Sleep log not found after insert")
    }

    /// Point lookup for the duplicate check. `exclude_id` skips the record
    /// being replaced on update.
    pub fn find_log_id_by_date(
        &self,
        user_id: i64,
        sleep_date: &str,
        exclude_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM sleep_logs
                 WHERE user_id = ?1 AND sleep_date = ?2 AND id != COALESCE(?3, -1)",
                params![user_id, sleep_date, exclude_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn get_sleep_log(&self, user_id: i64, id: i64) -> Result<Option<SleepLog>> {
        let log = self
            .conn
            .query_row(
                "SELECT id, user_id, sleep_date, sleep_score, bed_time, wakeup_time,
                        sleep_duration, wakeup_count, deep_sleep_continuity,
                        deep_sleep_percentage, light_sleep_percentage, rem_sleep_percentage,
                        created_at
                 FROM sleep_logs WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::sleep_log_from_row,
            )
            .optional()?;
        Ok(log)
    }

    /// Newest-first page of a user's history.
    pub fn list_logs_page(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<SleepLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, sleep_date, sleep_score, bed_time, wakeup_time,
                    sleep_duration, wakeup_count, deep_sleep_continuity,
                    deep_sleep_percentage, light_sleep_percentage, rem_sleep_percentage,
                    created_at
             FROM sleep_logs WHERE user_id = ?1
             ORDER BY sleep_date DESC LIMIT ?2 OFFSET ?3",
        )?;
        let logs = stmt
            .query_map(params![user_id, limit, offset], Self::sleep_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn count_logs(&self, user_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM sleep_logs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All records in one calendar month (`YYYY-MM`), date ascending.
    pub fn list_logs_for_month(&self, user_id: i64, month: &str) -> Result<Vec<SleepLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, sleep_date, sleep_score, bed_time, wakeup_time,
                    sleep_duration, wakeup_count, deep_sleep_continuity,
                    deep_sleep_percentage, light_sleep_percentage, rem_sleep_percentage,
                    created_at
             FROM sleep_logs
             WHERE user_id = ?1 AND strftime('%Y-%m', sleep_date) = ?2
             ORDER BY sleep_date ASC",
        )?;
        let logs = stmt
            .query_map(params![user_id, month], Self::sleep_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// A user's full history, date ascending — the order the statistics and
    /// the exporter expect.
    pub fn list_logs_ordered(&self, user_id: i64) -> Result<Vec<SleepLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, sleep_date, sleep_score, bed_time, wakeup_time,
                    sleep_duration, wakeup_count, deep_sleep_continuity,
                    deep_sleep_percentage, light_sleep_percentage, rem_sleep_percentage,
                    created_at
             FROM sleep_logs WHERE user_id = ?1 ORDER BY sleep_date ASC",
        )?;
        let logs = stmt
            .query_map(params![user_id], Self::sleep_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Full replace of one record. Returns false when the id does not exist
    /// for this user.
    pub fn update_sleep_log(&self, user_id: i64, id: i64, log: &NewSleepLog) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sleep_logs SET
                sleep_date = ?1, sleep_score = ?2, bed_time = ?3, wakeup_time = ?4,
                sleep_duration = ?5, wakeup_count = ?6, deep_sleep_continuity = ?7,
                deep_sleep_percentage = ?8, light_sleep_percentage = ?9,
                rem_sleep_percentage = ?10
             WHERE id = ?11 AND user_id = ?12",
            params![
                log.sleep_date,
                log.sleep_score,
                log.bed_time,
                log.wakeup_time,
                log.sleep_duration,
                log.wakeup_count,
                log.deep_sleep_continuity,
                log.deep_sleep_percentage,
                log.light_sleep_percentage,
                log.rem_sleep_percentage,
                id,
                user_id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_sleep_log(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sleep_logs WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }
}
