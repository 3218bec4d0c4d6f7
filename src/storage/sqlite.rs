//! SQLite-backed `Store`.
//!
//! Each table keeps the columns the dispatcher filters on plus the full
//! record as `json_data`. Writes that must be atomic (comment + response,
//! lease acquisition, task claims) run inside an immediate transaction so
//! several processes can share the same database file.

use crate::domain::{Comment, Integration, Policy, Response, ResponseStatus, RunTask, TaskState, Tenant};
use crate::error::{ReplyrError, Result};
use crate::storage::Store;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DB_FILE: &str = "replyr.db";

/// SQLite store shared across the scheduler, workers and approval actions.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            path: Some(db_path),
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private database, used by tests and one-shot tools.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                json_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS integrations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_integrations_tenant ON integrations(tenant_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_integrations_enabled_channel
                ON integrations(tenant_id, platform, channel_id) WHERE enabled = 1;

            CREATE TABLE IF NOT EXISTS policies (
                integration_id TEXT PRIMARY KEY,
                json_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                integration_id TEXT NOT NULL,
                external_comment_id TEXT NOT NULL UNIQUE,
                received_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_integration ON comments(integration_id);

            CREATE TABLE IF NOT EXISTS responses (
                id TEXT PRIMARY KEY,
                comment_id TEXT NOT NULL UNIQUE,
                integration_id TEXT NOT NULL,
                status TEXT NOT NULL,
                sent_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_responses_sent ON responses(integration_id, status, sent_at);

            CREATE TABLE IF NOT EXISTS run_leases (
                integration_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run_tasks (
                id TEXT PRIMARY KEY,
                integration_id TEXT NOT NULL,
                state TEXT NOT NULL,
                next_attempt_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_run_tasks_due ON run_tasks(state, next_attempt_at);
            "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ReplyrError::Storage(e.to_string()))
    }

    fn write_integration(db: &Connection, integration: &Integration) -> Result<()> {
        let json_data = serde_json::to_string(integration)?;
        db.execute(
            r#"
            INSERT OR REPLACE INTO integrations
            (id, tenant_id, platform, channel_id, enabled, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                integration.id,
                integration.tenant_id,
                integration.platform.as_str(),
                integration.channel_id,
                integration.enabled,
                json_data,
            ],
        )
        .map_err(|e| map_conflict(e, &integration.id))?;
        Ok(())
    }

    fn write_task(db: &Connection, task: &RunTask) -> Result<()> {
        let json_data = serde_json::to_string(task)?;
        db.execute(
            r#"
            INSERT OR REPLACE INTO run_tasks
            (id, integration_id, state, next_attempt_at, created_at, updated_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                task.id,
                task.integration_id,
                task.state.as_str(),
                task.next_attempt_at,
                task.created_at,
                task.updated_at,
                json_data,
            ],
        )?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, sql: &str, key: &str) -> Result<Option<T>> {
        let db = self.conn()?;
        let json: Option<String> = db.query_row(sql, params![key], |row| row.get(0)).optional()?;
        json.map(|j| decode(&j)).transpose()
    }
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

fn map_conflict(err: rusqlite::Error, id: &str) -> ReplyrError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            ReplyrError::Conflict(format!("enabled integration already exists for this channel ({})", id))
        }
        _ => ReplyrError::Database(err),
    }
}

impl Store for SqliteStore {
    fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let json_data = serde_json::to_string(tenant)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO tenants (id, json_data) VALUES (?1, ?2)",
            params![tenant.id, json_data],
        )?;
        Ok(())
    }

    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        self.get_json("SELECT json_data FROM tenants WHERE id = ?1", id)
    }

    fn create_integration(&self, integration: &Integration) -> Result<()> {
        let db = self.conn()?;
        let exists: Option<i64> = db
            .query_row("SELECT 1 FROM integrations WHERE id = ?1", params![integration.id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(ReplyrError::Conflict(format!("integration id already used: {}", integration.id)));
        }
        Self::write_integration(&db, integration)
    }

    fn get_integration(&self, id: &str) -> Result<Option<Integration>> {
        self.get_json("SELECT json_data FROM integrations WHERE id = ?1", id)
    }

    fn update_integration(&self, integration: &Integration) -> Result<()> {
        let db = self.conn()?;
        Self::write_integration(&db, integration)
    }

    fn list_enabled_integrations(&self) -> Result<Vec<Integration>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT json_data FROM integrations WHERE enabled = 1 ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut integrations = Vec::new();
        for json in rows {
            integrations.push(decode(&json?)?);
        }
        Ok(integrations)
    }

    fn touch_last_run(&self, integration_id: &str, at: i64) -> Result<()> {
        let db = self.conn()?;
        let json: Option<String> = db
            .query_row(
                "SELECT json_data FROM integrations WHERE id = ?1",
                params![integration_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(json) = json else {
            return Err(ReplyrError::IntegrationNotFound(integration_id.to_string()));
        };
        let mut integration: Integration = decode(&json)?;
        integration.last_run_at = Some(at);
        Self::write_integration(&db, &integration)
    }

    fn get_policy(&self, integration_id: &str) -> Result<Option<Policy>> {
        self.get_json("SELECT json_data FROM policies WHERE integration_id = ?1", integration_id)
    }

    fn save_policy(&self, integration_id: &str, policy: &Policy) -> Result<()> {
        let json_data = serde_json::to_string(policy)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO policies (integration_id, json_data) VALUES (?1, ?2)",
            params![integration_id, json_data],
        )?;
        Ok(())
    }

    fn comment_exists(&self, external_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM comments WHERE external_comment_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record_comment(&self, comment: &Comment, response: &Response) -> Result<bool> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO comments
            (id, integration_id, external_comment_id, received_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                comment.id,
                comment.integration_id,
                comment.external_id,
                comment.received_at,
                serde_json::to_string(comment)?,
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }

        tx.execute(
            r#"
            INSERT INTO responses
            (id, comment_id, integration_id, status, sent_at, created_at, updated_at, json_data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                response.id,
                comment.id,
                comment.integration_id,
                response.status.as_str(),
                response.sent_at,
                response.created_at,
                response.updated_at,
                serde_json::to_string(response)?,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        self.get_json("SELECT json_data FROM comments WHERE id = ?1", id)
    }

    fn get_response(&self, id: &str) -> Result<Option<Response>> {
        self.get_json("SELECT json_data FROM responses WHERE id = ?1", id)
    }

    fn update_response(&self, response: &Response) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE responses SET status = ?1, sent_at = ?2, updated_at = ?3, json_data = ?4 WHERE id = ?5",
            params![
                response.status.as_str(),
                response.sent_at,
                response.updated_at,
                serde_json::to_string(response)?,
                response.id,
            ],
        )?;
        if changed == 0 {
            return Err(ReplyrError::ResponseNotFound(response.id.clone()));
        }
        Ok(())
    }

    fn update_response_if(&self, response: &Response, expected: ResponseStatus) -> Result<bool> {
        let changed = self.conn()?.execute(
            r#"
            UPDATE responses SET status = ?1, sent_at = ?2, updated_at = ?3, json_data = ?4
            WHERE id = ?5 AND status = ?6
            "#,
            params![
                response.status.as_str(),
                response.sent_at,
                response.updated_at,
                serde_json::to_string(response)?,
                response.id,
                expected.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn list_responses(&self, integration_id: &str, status: ResponseStatus) -> Result<Vec<Response>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT json_data FROM responses WHERE integration_id = ?1 AND status = ?2 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![integration_id, status.as_str()], |row| row.get::<_, String>(0))?;

        let mut responses = Vec::new();
        for json in rows {
            responses.push(decode(&json?)?);
        }
        Ok(responses)
    }

    fn count_sent_for_integration(&self, integration_id: &str, since: i64) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM responses WHERE integration_id = ?1 AND status = 'sent' AND sent_at >= ?2",
            params![integration_id, since],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn count_sent_for_tenant(&self, tenant_id: &str, since: i64) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            r#"
            SELECT COUNT(*) FROM responses r
            JOIN integrations i ON r.integration_id = i.id
            WHERE i.tenant_id = ?1 AND r.status = 'sent' AND r.sent_at >= ?2
            "#,
            params![tenant_id, since],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn acquire_lease(&self, integration_id: &str, holder: &str, ttl_ms: i64, now: i64) -> Result<bool> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT holder, expires_at FROM run_leases WHERE integration_id = ?1",
                params![integration_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let free = match current {
            None => true,
            Some((current_holder, expires_at)) => current_holder == holder || expires_at <= now,
        };

        if free {
            tx.execute(
                "INSERT OR REPLACE INTO run_leases (integration_id, holder, expires_at) VALUES (?1, ?2, ?3)",
                params![integration_id, holder, now + ttl_ms],
            )?;
        }
        tx.commit()?;
        Ok(free)
    }

    fn release_lease(&self, integration_id: &str, holder: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM run_leases WHERE integration_id = ?1 AND holder = ?2",
            params![integration_id, holder],
        )?;
        Ok(())
    }

    fn insert_task(&self, task: &RunTask) -> Result<()> {
        let db = self.conn()?;
        Self::write_task(&db, task)
    }

    fn get_task(&self, id: &str) -> Result<Option<RunTask>> {
        self.get_json("SELECT json_data FROM run_tasks WHERE id = ?1", id)
    }

    fn update_task_if(&self, task: &RunTask, expected: TaskState) -> Result<bool> {
        let json_data = serde_json::to_string(task)?;
        let changed = self.conn()?.execute(
            r#"
            UPDATE run_tasks
            SET state = ?1, next_attempt_at = ?2, updated_at = ?3, json_data = ?4
            WHERE id = ?5 AND state = ?6
            "#,
            params![
                task.state.as_str(),
                task.next_attempt_at,
                task.updated_at,
                json_data,
                task.id,
                expected.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    fn cancel_task(&self, id: &str, now: i64) -> Result<bool> {
        let changed = self.conn()?.execute(
            r#"
            UPDATE run_tasks
            SET state = 'cancelled', updated_at = ?2,
                json_data = json_set(json_data, '$.state', 'cancelled', '$.updated_at', ?2)
            WHERE id = ?1 AND state IN ('queued', 'running')
            "#,
            params![id, now],
        )?;
        Ok(changed > 0)
    }

    fn prune_finished_tasks(&self, before: i64) -> Result<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM run_tasks WHERE state IN ('done', 'abandoned', 'cancelled') AND updated_at < ?1",
            params![before],
        )?;
        Ok(removed)
    }

    fn claim_next_task(&self, now: i64) -> Result<Option<RunTask>> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let json: Option<String> = tx
            .query_row(
                r#"
                SELECT json_data FROM run_tasks
                WHERE state = 'queued' AND next_attempt_at <= ?1
                ORDER BY next_attempt_at, created_at
                LIMIT 1
                "#,
                params![now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };

        let mut task: RunTask = decode(&json)?;
        task.state = TaskState::Running;
        task.attempts += 1;
        task.updated_at = now;
        Self::write_task(&tx, &task)?;
        tx.commit()?;

        Ok(Some(task))
    }

    fn requeue_running_tasks(&self, stale_before: i64, now: i64) -> Result<usize> {
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let tasks: Vec<RunTask> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT t.json_data FROM run_tasks t
                WHERE t.state = 'running' AND t.updated_at < ?1
                AND NOT EXISTS (
                    SELECT 1 FROM run_leases l
                    WHERE l.integration_id = t.integration_id AND l.expires_at > ?2
                )
                "#,
            )?;
            let rows = stmt.query_map(params![stale_before, now], |row| row.get::<_, String>(0))?;
            let mut tasks = Vec::new();
            for json in rows {
                tasks.push(decode(&json?)?);
            }
            tasks
        };

        for mut task in tasks.iter().cloned() {
            task.state = TaskState::Queued;
            task.next_attempt_at = now;
            task.updated_at = now;
            Self::write_task(&tx, &task)?;
        }
        tx.commit()?;

        Ok(tasks.len())
    }
}
