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

//! Template store
//!
//! Templates own everything else: deleting one cascades through its
//! versions, branches and variants.

use crate::branches::{get_branch_tx, upsert_branch_tx};
use crate::codec::{new_id, now, template_from_row, TEMPLATE_COLUMNS};
use crate::db::PromptDatabase;
use crate::error::{Entity, StoreError, StoreResult};
use crate::versions::insert_version_tx;
use promptvc_core::{
    validate_branch_name, Branch, ContentHasher, PromptPayload, PromptTemplate, PromptVersion,
    TemplateUpdate, DEFAULT_BRANCH,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Identity and metadata of a template to create
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub study_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    /// Branch created for the first version; defaults to `main`
    pub default_branch: Option<String>,
}

impl NewTemplate {
    pub fn new(
        study_id: impl Into<String>,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            study_id: study_id.into(),
            name: name.into(),
            description: None,
            created_by: created_by.into(),
            default_branch: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }
}

/// Result of [`TemplateStore::create_template`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTemplate {
    pub template: PromptTemplate,
    pub version: PromptVersion,
    pub branch: Branch,
}

pub struct TemplateStore {
    db: Arc<PromptDatabase>,
}

impl TemplateStore {
    pub fn new(db: Arc<PromptDatabase>) -> Self {
        Self { db }
    }

    /// Create a template, its first version and its default branch in one
    /// transaction. Nothing persists unless all three do.
    pub fn create_template(
        &self,
        new: NewTemplate,
        payload: PromptPayload,
        message: Option<String>,
    ) -> StoreResult<CreatedTemplate> {
        if new.name.trim().is_empty() {
            return Err(StoreError::invalid("template name must not be empty"));
        }
        let branch_name = new
            .default_branch
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        validate_branch_name(&branch_name)?;
        payload.validate()?;
        let content_hash = ContentHasher::hash(&payload);

        let created = self.db.write(|tx| {
            let ts = now();
            let template = PromptTemplate {
                id: new_id(),
                study_id: new.study_id.clone(),
                name: new.name.clone(),
                description: new.description.clone(),
                default_branch_name: branch_name.clone(),
                created_by: new.created_by.clone(),
                created_at: ts,
                updated_at: ts,
            };
            tx.execute(
                &format!(
                    "INSERT INTO prompt_templates({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    TEMPLATE_COLUMNS
                ),
                params![
                    template.id,
                    template.study_id,
                    template.name,
                    template.description,
                    template.default_branch_name,
                    template.created_by,
                    template.created_at,
                    template.updated_at,
                ],
            )?;

            let version = insert_version_tx(
                tx,
                &template.id,
                &payload,
                &content_hash,
                None,
                message.as_deref(),
                &new.created_by,
            )?;
            let branch = upsert_branch_tx(tx, &template.id, &branch_name, &version.id)?;

            Ok(CreatedTemplate {
                template,
                version,
                branch,
            })
        })?;

        info!(
            template_id = %created.template.id,
            study_id = %created.template.study_id,
            hash = %created.version.content_hash.short(),
            "Created prompt template"
        );
        Ok(created)
    }

    pub fn get_template(&self, template_id: &str) -> StoreResult<PromptTemplate> {
        self.db.read(|conn| {
            get_template_tx(conn, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))
        })
    }

    /// Templates of a study, oldest first
    pub fn list_templates(&self, study_id: &str) -> StoreResult<Vec<PromptTemplate>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM prompt_templates WHERE study_id = ?1 ORDER BY created_at, id",
                TEMPLATE_COLUMNS
            ))?;
            let rows = stmt.query_map(params![study_id], template_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Change name, description or default branch. A new default branch
    /// must already exist.
    pub fn update_template(
        &self,
        template_id: &str,
        update: TemplateUpdate,
    ) -> StoreResult<PromptTemplate> {
        let template = self.db.write(|tx| {
            let mut template = get_template_tx(tx, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;

            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(StoreError::invalid("template name must not be empty"));
                }
                template.name = name;
            }
            if let Some(description) = update.description {
                template.description = description;
            }
            if let Some(branch) = update.default_branch_name {
                validate_branch_name(&branch)?;
                if get_branch_tx(tx, template_id, &branch)?.is_none() {
                    return Err(StoreError::invalid(format!(
                        "branch '{}' does not exist for template {}",
                        branch, template_id
                    )));
                }
                template.default_branch_name = branch;
            }
            template.updated_at = now();

            tx.execute(
                "UPDATE prompt_templates SET name = ?2, description = ?3, \
                   default_branch_name = ?4, updated_at = ?5 WHERE id = ?1",
                params![
                    template.id,
                    template.name,
                    template.description,
                    template.default_branch_name,
                    template.updated_at,
                ],
            )?;
            Ok(template)
        })?;

        info!(template_id, "Updated prompt template");
        Ok(template)
    }

    /// Irreversibly delete a template with all its versions, branches and variants
    pub fn delete_template(&self, template_id: &str) -> StoreResult<()> {
        let version_count: u32 = self.db.write(|tx| {
            let versions = tx.query_row(
                "SELECT COUNT(*) FROM prompt_versions WHERE template_id = ?1",
                params![template_id],
                |row| row.get(0),
            )?;
            // One statement for the whole version tree: the parent key is only
            // checked once it completes, so chain length does not matter
            tx.execute(
                "DELETE FROM prompt_versions WHERE template_id = ?1",
                params![template_id],
            )?;
            let deleted = tx.execute(
                "DELETE FROM prompt_templates WHERE id = ?1",
                params![template_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::not_found(Entity::Template, template_id));
            }
            Ok(versions)
        })?;

        info!(template_id, versions = version_count, "Deleted prompt template");
        Ok(())
    }
}

pub(crate) fn get_template_tx(
    conn: &Connection,
    template_id: &str,
) -> StoreResult<Option<PromptTemplate>> {
    let template = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_templates WHERE id = ?1",
                TEMPLATE_COLUMNS
            ),
            params![template_id],
            template_from_row,
        )
        .optional()?;
    Ok(template)
}
