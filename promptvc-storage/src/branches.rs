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

//! Branch registry
//!
//! Named, movable pointers into a template's version graph. A branch can be
//! pointed at any version of its own template; the composite foreign key
//! on `(version_id, template_id)` rejects anything else.

use crate::codec::{branch_from_row, now, BRANCH_COLUMNS};
use crate::db::PromptDatabase;
use crate::error::{is_foreign_key_violation, unique_violation, Entity, StoreError, StoreResult};
use crate::templates::get_template_tx;
use crate::versions::find_in_template_tx;
use promptvc_core::{validate_branch_name, Branch, BranchInfo};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::info;

pub struct BranchRegistry {
    db: Arc<PromptDatabase>,
}

impl BranchRegistry {
    pub fn new(db: Arc<PromptDatabase>) -> Self {
        Self { db }
    }

    /// Create a new branch. Without a version it starts where the
    /// template's default branch currently points.
    pub fn create_branch(
        &self,
        template_id: &str,
        name: &str,
        version_id: Option<&str>,
    ) -> StoreResult<Branch> {
        validate_branch_name(name)?;

        let branch = self.db.write(|tx| {
            let template = get_template_tx(tx, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;

            if get_branch_tx(tx, template_id, name)?.is_some() {
                return Err(StoreError::already_exists(Entity::Branch, name));
            }

            let target = match version_id {
                Some(id) => {
                    ensure_version_in_template(tx, template_id, id)?;
                    id.to_string()
                }
                None => get_branch_tx(tx, template_id, &template.default_branch_name)?
                    .map(|b| b.version_id)
                    .ok_or_else(|| {
                        StoreError::invalid(format!(
                            "default branch '{}' has no version to start from",
                            template.default_branch_name
                        ))
                    })?,
            };

            let ts = now();
            tx.execute(
                &format!(
                    "INSERT INTO prompt_branches({}) VALUES (?1, ?2, ?3, ?4, ?4)",
                    BRANCH_COLUMNS
                ),
                params![template_id, name, target, ts],
            )
            .map_err(|err| map_branch_error(err, template_id, name, &target))?;

            get_branch_tx(tx, template_id, name)?
                .ok_or_else(|| StoreError::not_found(Entity::Branch, name))
        })?;

        info!(template_id, branch = name, version_id = %branch.version_id, "Created branch");
        Ok(branch)
    }

    /// Point an existing branch at another version of the same template
    pub fn move_branch(&self, template_id: &str, name: &str, version_id: &str) -> StoreResult<Branch> {
        let branch = self.db.write(|tx| {
            let current = get_branch_tx(tx, template_id, name)?
                .ok_or_else(|| StoreError::not_found(Entity::Branch, name))?;
            ensure_version_in_template(tx, template_id, version_id)?;

            if current.version_id != version_id {
                tx.execute(
                    "UPDATE prompt_branches SET version_id = ?3, updated_at = ?4 \
                     WHERE template_id = ?1 AND name = ?2",
                    params![template_id, name, version_id, now()],
                )
                .map_err(|err| map_branch_error(err, template_id, name, version_id))?;
            }

            get_branch_tx(tx, template_id, name)?
                .ok_or_else(|| StoreError::not_found(Entity::Branch, name))
        })?;

        info!(template_id, branch = name, version_id, "Moved branch");
        Ok(branch)
    }

    /// Create the branch or move it, whichever applies
    pub fn upsert_branch(&self, template_id: &str, name: &str, version_id: &str) -> StoreResult<Branch> {
        validate_branch_name(name)?;
        self.db.write(|tx| {
            get_template_tx(tx, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;
            ensure_version_in_template(tx, template_id, version_id)?;
            upsert_branch_tx(tx, template_id, name, version_id)
        })
    }

    /// Delete a branch. The template's default branch cannot be deleted.
    pub fn delete_branch(&self, template_id: &str, name: &str) -> StoreResult<()> {
        self.db.write(|tx| {
            let template = get_template_tx(tx, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;
            if template.default_branch_name == name {
                return Err(StoreError::invalid(format!(
                    "cannot delete default branch '{}'",
                    name
                )));
            }

            let deleted = tx.execute(
                "DELETE FROM prompt_branches WHERE template_id = ?1 AND name = ?2",
                params![template_id, name],
            )?;
            if deleted == 0 {
                return Err(StoreError::not_found(Entity::Branch, name));
            }
            Ok(())
        })?;

        info!(template_id, branch = name, "Deleted branch");
        Ok(())
    }

    /// All branches of a template with their target's version number
    pub fn list_branches(&self, template_id: &str) -> StoreResult<Vec<BranchInfo>> {
        self.db.read(|conn| {
            let template = get_template_tx(conn, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;

            let mut stmt = conn.prepare(
                "SELECT b.template_id, b.name, b.version_id, b.created_at, b.updated_at, \
                        v.version_number \
                 FROM prompt_branches b \
                 JOIN prompt_versions v ON v.id = b.version_id \
                 WHERE b.template_id = ?1 \
                 ORDER BY b.name",
            )?;
            let rows = stmt.query_map(params![template_id], |row| {
                let branch = branch_from_row(row)?;
                let version_number: u32 = row.get(5)?;
                Ok((branch, version_number))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (branch, version_number) = row?;
                let is_default = branch.name == template.default_branch_name;
                out.push(BranchInfo {
                    branch,
                    version_number,
                    is_default,
                });
            }
            Ok(out)
        })
    }

    pub fn get_branch(&self, template_id: &str, name: &str) -> StoreResult<Branch> {
        self.db.read(|conn| {
            get_branch_tx(conn, template_id, name)?
                .ok_or_else(|| StoreError::not_found(Entity::Branch, name))
        })
    }
}

fn ensure_version_in_template(conn: &Connection, template_id: &str, version_id: &str) -> StoreResult<()> {
    find_in_template_tx(conn, template_id, version_id)?
        .map(|_| ())
        .ok_or_else(|| StoreError::not_found(Entity::Version, version_id))
}

fn map_branch_error(err: rusqlite::Error, template_id: &str, name: &str, version_id: &str) -> StoreError {
    if unique_violation(&err).is_some() {
        return StoreError::already_exists(Entity::Branch, name);
    }
    if is_foreign_key_violation(&err) {
        tracing::debug!(template_id, version_id, "Branch target rejected by foreign key");
        return StoreError::not_found(Entity::Version, version_id);
    }
    StoreError::Database(err)
}

pub(crate) fn get_branch_tx(conn: &Connection, template_id: &str, name: &str) -> StoreResult<Option<Branch>> {
    let branch = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_branches WHERE template_id = ?1 AND name = ?2",
                BRANCH_COLUMNS
            ),
            params![template_id, name],
            branch_from_row,
        )
        .optional()?;
    Ok(branch)
}

/// Insert or move a branch in one statement. Must run inside a write
/// transaction; the caller has already validated the name.
pub(crate) fn upsert_branch_tx(
    conn: &Connection,
    template_id: &str,
    name: &str,
    version_id: &str,
) -> StoreResult<Branch> {
    let ts = now();
    conn.execute(
        &format!(
            "INSERT INTO prompt_branches({}) VALUES (?1, ?2, ?3, ?4, ?4) \
             ON CONFLICT(template_id, name) DO UPDATE SET \
               version_id = excluded.version_id, \
               updated_at = excluded.updated_at",
            BRANCH_COLUMNS
        ),
        params![template_id, name, version_id, ts],
    )
    .map_err(|err| map_branch_error(err, template_id, name, version_id))?;

    get_branch_tx(conn, template_id, name)?
        .ok_or_else(|| StoreError::not_found(Entity::Branch, name))
}
