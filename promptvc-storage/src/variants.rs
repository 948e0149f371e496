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

//! Variant store
//!
//! Per-(version, model config) override layers. A variant only ever
//! overrides the system prompt, the user prompt template and the few-shot
//! examples; everything else always comes from its version.

use crate::codec::{new_id, now, to_json, variant_from_row, VARIANT_COLUMNS};
use crate::db::PromptDatabase;
use crate::error::{is_foreign_key_violation, unique_violation, Entity, StoreError, StoreResult};
use crate::model_config::ModelConfigLookup;
use crate::templates::get_template_tx;
use crate::versions::find_in_template_tx;
use promptvc_core::{FewShotExample, Variant, VariantOverrides, VariantUpdate};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::{debug, info};

/// Optional filters for [`VariantStore::list_variants`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantFilter {
    pub version_id: Option<String>,
    pub model_config_id: Option<String>,
}

impl VariantFilter {
    pub fn for_version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            model_config_id: None,
        }
    }

    pub fn for_model_config(model_config_id: impl Into<String>) -> Self {
        Self {
            version_id: None,
            model_config_id: Some(model_config_id.into()),
        }
    }
}

pub struct VariantStore {
    db: Arc<PromptDatabase>,
    model_configs: Arc<dyn ModelConfigLookup>,
}

impl VariantStore {
    pub fn new(db: Arc<PromptDatabase>, model_configs: Arc<dyn ModelConfigLookup>) -> Self {
        Self { db, model_configs }
    }

    pub fn create_variant(
        &self,
        template_id: &str,
        version_id: &str,
        model_config_id: &str,
        overrides: VariantOverrides,
        notes: Option<String>,
    ) -> StoreResult<Variant> {
        let study_id = self
            .db
            .read(|conn| get_template_tx(conn, template_id))?
            .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?
            .study_id;

        if self.model_configs.get(&study_id, model_config_id)?.is_none() {
            return Err(StoreError::not_found(Entity::ModelConfig, model_config_id));
        }

        let variant = self.db.write(|tx| {
            find_in_template_tx(tx, template_id, version_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Version, version_id))?;

            let id = new_id();
            let ts = now();
            tx.execute(
                &format!(
                    "INSERT INTO prompt_variants({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    VARIANT_COLUMNS
                ),
                params![
                    id,
                    version_id,
                    model_config_id,
                    overrides.system_prompt_override,
                    overrides.user_prompt_template_override,
                    examples_json(overrides.few_shot_examples_override.as_deref())?,
                    notes,
                    ts,
                ],
            )
            .map_err(|err| {
                if unique_violation(&err).is_some() {
                    StoreError::already_exists(
                        Entity::Variant,
                        format!("{}/{}", version_id, model_config_id),
                    )
                } else if is_foreign_key_violation(&err) {
                    StoreError::not_found(Entity::Version, version_id)
                } else {
                    StoreError::Database(err)
                }
            })?;

            get_variant_by_id_tx(tx, &id)?.ok_or_else(|| StoreError::not_found(Entity::Variant, &id))
        })?;

        info!(
            template_id,
            version_id,
            model_config_id,
            variant_id = %variant.id,
            "Created variant"
        );
        Ok(variant)
    }

    /// Fetch a variant, requiring that it belongs to `template_id`
    pub fn get_variant(&self, template_id: &str, variant_id: &str) -> StoreResult<Variant> {
        self.db.read(|conn| {
            get_in_template_tx(conn, template_id, variant_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Variant, variant_id))
        })
    }

    pub fn get_variant_by_id(&self, variant_id: &str) -> StoreResult<Variant> {
        self.db.read(|conn| {
            get_variant_by_id_tx(conn, variant_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Variant, variant_id))
        })
    }

    /// Apply set/clear changes to a variant's overrides and notes
    pub fn update_variant(
        &self,
        template_id: &str,
        variant_id: &str,
        update: VariantUpdate,
    ) -> StoreResult<Variant> {
        if update.is_empty() {
            debug!(variant_id, "Empty variant update");
            return self.get_variant(template_id, variant_id);
        }

        let variant = self.db.write(|tx| {
            let mut variant = get_in_template_tx(tx, template_id, variant_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Variant, variant_id))?;

            if let Some(value) = update.system_prompt_override {
                variant.overrides.system_prompt_override = value;
            }
            if let Some(value) = update.user_prompt_template_override {
                variant.overrides.user_prompt_template_override = value;
            }
            if let Some(value) = update.few_shot_examples_override {
                variant.overrides.few_shot_examples_override = value;
            }
            if let Some(value) = update.notes {
                variant.notes = value;
            }
            variant.updated_at = now();

            tx.execute(
                "UPDATE prompt_variants SET \
                   system_prompt_override = ?2, \
                   user_prompt_template_override = ?3, \
                   few_shot_examples_override = ?4, \
                   notes = ?5, \
                   updated_at = ?6 \
                 WHERE id = ?1",
                params![
                    variant.id,
                    variant.overrides.system_prompt_override,
                    variant.overrides.user_prompt_template_override,
                    examples_json(variant.overrides.few_shot_examples_override.as_deref())?,
                    variant.notes,
                    variant.updated_at,
                ],
            )?;
            Ok(variant)
        })?;

        info!(template_id, variant_id, "Updated variant");
        Ok(variant)
    }

    pub fn delete_variant(&self, template_id: &str, variant_id: &str) -> StoreResult<()> {
        self.db.write(|tx| {
            get_in_template_tx(tx, template_id, variant_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Variant, variant_id))?;
            tx.execute("DELETE FROM prompt_variants WHERE id = ?1", params![variant_id])?;
            Ok(())
        })?;

        info!(template_id, variant_id, "Deleted variant");
        Ok(())
    }

    /// Variants of a template, optionally narrowed by version and/or model config
    pub fn list_variants(&self, template_id: &str, filter: &VariantFilter) -> StoreResult<Vec<Variant>> {
        self.db.read(|conn| {
            get_template_tx(conn, template_id)?
                .ok_or_else(|| StoreError::not_found(Entity::Template, template_id))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM prompt_variants \
                 WHERE version_id IN (SELECT id FROM prompt_versions WHERE template_id = ?1) \
                   AND (?2 IS NULL OR version_id = ?2) \
                   AND (?3 IS NULL OR model_config_id = ?3) \
                 ORDER BY created_at, id",
                VARIANT_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![template_id, filter.version_id, filter.model_config_id],
                variant_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

fn examples_json(examples: Option<&[FewShotExample]>) -> StoreResult<Option<String>> {
    examples.map(to_json).transpose()
}

pub(crate) fn get_variant_by_id_tx(conn: &Connection, variant_id: &str) -> StoreResult<Option<Variant>> {
    let variant = conn
        .query_row(
            &format!("SELECT {} FROM prompt_variants WHERE id = ?1", VARIANT_COLUMNS),
            params![variant_id],
            variant_from_row,
        )
        .optional()?;
    Ok(variant)
}

fn get_in_template_tx(
    conn: &Connection,
    template_id: &str,
    variant_id: &str,
) -> StoreResult<Option<Variant>> {
    let variant = conn
        .query_row(
            &format!(
                "SELECT {} FROM prompt_variants WHERE id = ?1 \
                 AND version_id IN (SELECT id FROM prompt_versions WHERE template_id = ?2)",
                VARIANT_COLUMNS
            ),
            params![variant_id, template_id],
            variant_from_row,
        )
        .optional()?;
    Ok(variant)
}
