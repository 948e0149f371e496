// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Embedded relational store
//!
//! A single SQLite database holds templates, versions, branches and
//! variants. The integrity rules that matter under concurrency live in the
//! schema (unique keys, composite foreign keys, cascades); application-level
//! checks only exist to produce friendlier errors.

use crate::error::StoreResult;
use parking_lot::Mutex;
use promptvc_core::StorageConfig;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCHEMA_VERSION: &str = "1";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prompt_templates (
  id TEXT PRIMARY KEY,
  study_id TEXT NOT NULL,
  name TEXT NOT NULL,
  description TEXT,
  default_branch_name TEXT NOT NULL,
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prompt_versions (
  id TEXT PRIMARY KEY,
  template_id TEXT NOT NULL REFERENCES prompt_templates(id) ON DELETE CASCADE,
  version_number INTEGER NOT NULL CHECK (version_number > 0),
  parent_version_id TEXT,
  content_hash TEXT NOT NULL,
  system_prompt TEXT NOT NULL,
  user_prompt_template TEXT NOT NULL,
  template_variables TEXT NOT NULL DEFAULT '[]',
  few_shot_examples TEXT NOT NULL DEFAULT '[]',
  output_schema TEXT,
  tool_definitions TEXT NOT NULL DEFAULT '[]',
  message TEXT,
  created_by TEXT NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE (template_id, version_number),
  UNIQUE (template_id, content_hash),
  UNIQUE (id, template_id),
  FOREIGN KEY (parent_version_id, template_id)
    REFERENCES prompt_versions(id, template_id)
);

CREATE TABLE IF NOT EXISTS prompt_branches (
  template_id TEXT NOT NULL REFERENCES prompt_templates(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  version_id TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (template_id, name),
  FOREIGN KEY (version_id, template_id)
    REFERENCES prompt_versions(id, template_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS prompt_variants (
  id TEXT PRIMARY KEY,
  version_id TEXT NOT NULL REFERENCES prompt_versions(id) ON DELETE CASCADE,
  model_config_id TEXT NOT NULL,
  system_prompt_override TEXT,
  user_prompt_template_override TEXT,
  few_shot_examples_override TEXT,
  notes TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE (version_id, model_config_id)
);

CREATE INDEX IF NOT EXISTS idx_templates_study ON prompt_templates(study_id);
CREATE INDEX IF NOT EXISTS idx_versions_parent ON prompt_versions(parent_version_id);
CREATE INDEX IF NOT EXISTS idx_branches_version ON prompt_branches(version_id);
CREATE INDEX IF NOT EXISTS idx_variants_model_config ON prompt_variants(model_config_id);
"#;

/// Shared handle to the prompt database.
///
/// Every public store operation is one unit of work: reads take the
/// connection, writes run inside a `BEGIN IMMEDIATE` transaction so the
/// read-then-insert steps they contain (next version number, duplicate
/// check) cannot interleave with another writer.
pub struct PromptDatabase {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl PromptDatabase {
    /// Open (or create) a file-backed database
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_config(config: &StorageConfig) -> StoreResult<Self> {
        Self::open_with_timeout(
            &config.database_path,
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self::from_connection(conn, Some(path.clone()))?;
        tracing::info!("Opened prompt database at {:?}", path);
        Ok(db)
    }

    /// Private in-memory database (tests, ephemeral tooling)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> StoreResult<String> {
        self.read(|conn| {
            let version = conn.query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )?;
            Ok(version)
        })
    }

    /// Run a read-only unit of work
    pub(crate) fn read<T, F>(&self, func: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        func(&conn)
    }

    /// Run a write unit of work. Commits on `Ok`, rolls back on `Err`.
    pub(crate) fn write<T, F>(&self, func: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = func(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}
