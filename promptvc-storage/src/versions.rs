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

//! Version store
//!
//! Immutable, content-addressed prompt versions. Numbers are assigned as
//! max + 1 inside the same immediate transaction as the insert, and the
//! `(template_id, content_hash)` unique key is the authority on duplicates.

use crate::branches::{get_branch_tx, upsert_branch_tx};
use crate::codec::{new_id, now, to_json, version_from_row, VERSION_COLUMNS};
use crate::db::PromptDatabase;
use crate::error::{unique_violation, Entity, StoreError, StoreResult};
use crate::templates::get_template_tx;
use promptvc_core::{
    validate_branch_name, ContentHash, ContentHasher, Page, PromptPayload, PromptVersion,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

/// Input for a new version
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub payload: PromptPayload,
    /// Defaults to the target branch's current version
    pub parent_version_id: Option<String>,
    /// Branch moved to the new version; defaults to the template's default branch
    pub branch: Option<String>,
    pub message: Option<String>,
    pub created_by: String,
}

impl NewVersion {
    pub fn new(payload: PromptPayload, created_by: impl Into<String>) -> Self {
        Self {
            payload,
            parent_version_id: None,
            branch: None,
            message: None,
            created_by: created_by.into(),
        }
    }

    pub fn with_parent(mut self, version_id: impl Into<String>) -> Self {
        self.parent_version_id = Some(version_id.into());
        self
    }

    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Address of a version inside a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRef {
    Id(String),
    Number(u32),
}

impl From<u32> for VersionRef {
    fn from(number: u32) -> Self {
        VersionRef::Number(number)
    }
}

impl From<&str> for VersionRef {
    fn from(id: &str) -> Self {
        VersionRef::Id(id.to_string())
    }
}

impl From<String> for VersionRef {
    fn from(id: String) -> Self {
        VersionRef::Id(id)
    }
}

impl std::fmt::Display for VersionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionRef::Id(id) => f.write_str(id),
            VersionRef::Number(n) => write!(f, "#{}", n),
        }
    }
}

pub struct VersionStore {
    db: Arc<PromptDatabase>,
    max_page_size: u32,
}

impl VersionStore {
    pub fn new(db: Arc<PromptDatabase>) -> Self {
        Self {
            db,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Create a version and move its branch to it, atomically.
    ///
    /// Identical content fails with [`StoreError::DuplicateContent`] naming the
    /// existing version; it is never silently reused.
    pub fn create_version(&self, template_id: &str, new: NewVersion) -> StoreResult<PromptVersion> {
        new.payload.validate()?;
        let content_hash = ContentHasher::hash(&new.payload);

        let (version, branch) = self.db.write(|tx| {
            let template = get_template_tx(tx, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;

            let branch = new
                .branch
                .clone()
                .unwrap_or_else(|| template.default_branch_name.clone());
            validate_branch_name(&branch)?;

            let parent = match &new.parent_version_id {
                Some(parent_id) => {
                    find_in_template_tx(tx, template_id, parent_id)?
                        .ok_or_else(|| StoreError::not_found(Entity::Version, parent_id))?;
                    Some(parent_id.clone())
                }
                // A new branch forks from the default branch so history stays one tree
                None => match get_branch_tx(tx, template_id, &branch)? {
                    Some(tip) => Some(tip.version_id),
                    None => get_branch_tx(tx, template_id, &template.default_branch_name)?
                        .map(|b| b.version_id),
                },
            };

            let version = insert_version_tx(
                tx,
                template_id,
                &new.payload,
                &content_hash,
                parent.as_deref(),
                new.message.as_deref(),
                &new.created_by,
            )?;
            upsert_branch_tx(tx, template_id, &branch, &version.id)?;
            Ok((version, branch))
        })?;

        info!(
            template_id,
            version = version.version_number,
            hash = %version.content_hash.short(),
            branch = %branch,
            "Created prompt version"
        );
        Ok(version)
    }

    pub fn get_version(
        &self,
        template_id: &str,
        version: impl Into<VersionRef>,
    ) -> StoreResult<PromptVersion> {
        let version = version.into();
        self.db.read(|conn| {
            let found = match &version {
                VersionRef::Id(id) => find_in_template_tx(conn, template_id, id)?,
                VersionRef::Number(n) => find_by_number_tx(conn, template_id, *n)?,
            };
            found.ok_or_else(|| StoreError::not_found(Entity::Version, version.to_string()))
        })
    }

    /// Look up a version without knowing its template
    pub fn get_version_by_id(&self, version_id: &str) -> StoreResult<PromptVersion> {
        self.db.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM prompt_versions WHERE id = ?1", VERSION_COLUMNS),
                params![version_id],
                version_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found(Entity::Version, version_id))
        })
    }

    /// Versions newest-number first
    pub fn list_versions(&self, template_id: &str, page: Page) -> StoreResult<Vec<PromptVersion>> {
        let page = page.clamped(self.max_page_size);
        self.db.read(|conn| {
            ensure_template(conn, template_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM prompt_versions WHERE template_id = ?1 \
                 ORDER BY version_number DESC LIMIT ?2 OFFSET ?3",
                VERSION_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![template_id, page.limit, page.offset],
                version_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn count_versions(&self, template_id: &str) -> StoreResult<u32> {
        self.db.read(|conn| {
            ensure_template(conn, template_id)?;
            let count = conn.query_row(
                "SELECT COUNT(*) FROM prompt_versions WHERE template_id = ?1",
                params![template_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Current target of a branch; `None` if the branch does not exist
    pub fn latest_on_branch(
        &self,
        template_id: &str,
        branch: &str,
    ) -> StoreResult<Option<PromptVersion>> {
        self.db.read(|conn| {
            let version = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM prompt_versions WHERE id = \
                         (SELECT version_id FROM prompt_branches WHERE template_id = ?1 AND name = ?2)",
                        VERSION_COLUMNS
                    ),
                    params![template_id, branch],
                    version_from_row,
                )
                .optional()?;
            Ok(version)
        })
    }

    pub fn find_by_content_hash(
        &self,
        template_id: &str,
        hash: &ContentHash,
    ) -> StoreResult<Option<PromptVersion>> {
        self.db
            .read(|conn| find_by_hash_tx(conn, template_id, hash.as_str()))
    }

    /// Walk parent pointers from `version_id` back to the root, newest first
    pub fn history(
        &self,
        template_id: &str,
        version_id: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<PromptVersion>> {
        self.db
            .read(|conn| history_tx(conn, template_id, version_id, limit))
    }

    /// Whether `ancestor_id` is on the parent chain of `descendant_id`
    /// (a version counts as its own ancestor)
    pub fn is_ancestor(
        &self,
        template_id: &str,
        ancestor_id: &str,
        descendant_id: &str,
    ) -> StoreResult<bool> {
        self.db.read(|conn| {
            find_in_template_tx(conn, template_id, ancestor_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Version, ancestor_id))?;
            let chain = history_tx(conn, template_id, descendant_id, None)?;
            Ok(chain.iter().any(|v| v.id == ancestor_id))
        })
    }
}

fn history_tx(
    conn: &Connection,
    template_id: &str,
    version_id: &str,
    limit: Option<usize>,
) -> StoreResult<Vec<PromptVersion>> {
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(version_id.to_string());

    while let Some(id) = current {
        if let Some(max) = limit {
            if entries.len() >= max {
                break;
            }
        }
        if !visited.insert(id.clone()) {
            break;
        }

        let version = find_in_template_tx(conn, template_id, &id)?
            .ok_or_else(|| StoreError::not_found(Entity::Version, &id))?;
        current = version.parent_version_id.clone();
        entries.push(version);
    }

    Ok(entries)
}

fn ensure_template(conn: &Connection, template_id: &str) -> StoreResult<()> {
    get_template_tx(conn, template_id)?
        .map(|_| ())
        .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))
}

pub(crate) fn find_in_template_tx(
    conn: &Connection,
    template_id: &str,
    version_id: &str,
) -> StoreResult<Option<PromptVersion>> {
    let version = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_versions WHERE template_id = ?1 AND id = ?2",
                VERSION_COLUMNS
            ),
            params![template_id, version_id],
            version_from_row,
        )
        .optional()?;
    Ok(version)
}

pub(crate) fn find_by_number_tx(
    conn: &Connection,
    template_id: &str,
    number: u32,
) -> StoreResult<Option<PromptVersion>> {
    let version = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_versions WHERE template_id = ?1 AND version_number = ?2",
                VERSION_COLUMNS
            ),
            params![template_id, number],
            version_from_row,
        )
        .optional()?;
    Ok(version)
}

fn find_by_hash_tx(
    conn: &Connection,
    template_id: &str,
    hash: &str,
) -> StoreResult<Option<PromptVersion>> {
    let version = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_versions WHERE template_id = ?1 AND content_hash = ?2",
                VERSION_COLUMNS
            ),
            params![template_id, hash],
            version_from_row,
        )
        .optional()?;
    Ok(version)
}

/// Insert a version row. Must run inside a write transaction.
pub(crate) fn insert_version_tx(
    conn: &Connection,
    template_id: &str,
    payload: &PromptPayload,
    content_hash: &ContentHash,
    parent_version_id: Option<&str>,
    message: Option<&str>,
    created_by: &str,
) -> StoreResult<PromptVersion> {
    // Advisory: gives the caller the existing version number
    if let Some(existing) = find_by_hash_tx(conn, template_id, content_hash.as_str())? {
        debug!(
            template_id,
            existing = existing.version_number,
            "Rejected duplicate prompt content"
        );
        return Err(StoreError::DuplicateContent {
            version_id: existing.id,
            version_number: existing.version_number,
        });
    }

    let version_number: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM prompt_versions WHERE template_id = ?1",
        params![template_id],
        |row| row.get(0),
    )?;

    let version = PromptVersion {
        id: new_id(),
        template_id: template_id.to_string(),
        version_number,
        parent_version_id: parent_version_id.map(str::to_string),
        content_hash: content_hash.clone(),
        payload: payload.clone(),
        message: message.map(str::to_string),
        created_by: created_by.to_string(),
        created_at: now(),
    };

    let output_schema = match &payload.output_schema {
        Some(schema) => Some(to_json(schema)?),
        None => None,
    };

    let inserted = conn.execute(
        &format!(
            "INSERT INTO prompt_versions({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            VERSION_COLUMNS
        ),
        params![
            version.id,
            version.template_id,
            version.version_number,
            version.parent_version_id,
            version.content_hash.as_str(),
            payload.system_prompt,
            payload.user_prompt_template,
            to_json(&payload.template_variables)?,
            to_json(&payload.few_shot_examples)?,
            output_schema,
            to_json(&payload.tool_definitions)?,
            version.message,
            version.created_by,
            version.created_at,
        ],
    );

    match inserted {
        Ok(_) => Ok(version),
        Err(err) => Err(map_insert_error(conn, template_id, content_hash, version_number, err)),
    }
}

/// Translate constraint violations that slipped past the advisory checks
fn map_insert_error(
    conn: &Connection,
    template_id: &str,
    content_hash: &ContentHash,
    version_number: u32,
    err: rusqlite::Error,
) -> StoreError {
    let Some(message) = unique_violation(&err) else {
        return StoreError::Database(err);
    };

    if message.contains("content_hash") {
        return match find_by_hash_tx(conn, template_id, content_hash.as_str()) {
            Ok(Some(existing)) => StoreError::DuplicateContent {
                version_id: existing.id,
                version_number: existing.version_number,
            },
            _ => StoreError::Conflict(format!(
                "content {} was committed concurrently",
                content_hash.short()
            )),
        };
    }

    if message.contains("version_number") {
        return StoreError::Conflict(format!(
            "version number {} was taken concurrently, retry",
            version_number
        ));
    }

    StoreError::Database(err)
}
