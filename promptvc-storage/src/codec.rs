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

//! Row <-> record conversion
//!
//! Structured payload fields are stored as JSON text. Reading them back
//! never fails: corrupt text is logged and replaced by the empty value.

use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use promptvc_core::{
    Branch, ContentHash, PromptPayload, PromptTemplate, PromptVersion, Variant, VariantOverrides,
};
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) const TEMPLATE_COLUMNS: &str = "id, study_id, name, description, default_branch_name, \
     created_by, created_at, updated_at";

pub(crate) const VERSION_COLUMNS: &str = "id, template_id, version_number, parent_version_id, \
     content_hash, system_prompt, user_prompt_template, template_variables, few_shot_examples, \
     output_schema, tool_definitions, message, created_by, created_at";

pub(crate) const BRANCH_COLUMNS: &str = "template_id, name, version_id, created_at, updated_at";

pub(crate) const VARIANT_COLUMNS: &str = "id, version_id, model_config_id, \
     system_prompt_override, user_prompt_template_override, few_shot_examples_override, notes, \
     created_at, updated_at";

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Parse stored JSON, falling back to `T::default()` on absence or corruption
pub(crate) fn parse_or_empty<T>(raw: Option<&str>, field: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match raw {
        None => T::default(),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!(field, error = %e, "Unreadable stored JSON, using empty value");
            T::default()
        }),
    }
}

/// Parse an optional stored JSON value; corruption reads as absent
pub(crate) fn parse_optional<T>(raw: Option<&str>, field: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let text = raw?;
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(field, error = %e, "Unreadable stored JSON, treating as absent");
            None
        }
    }
}

pub(crate) fn template_from_row(row: &Row<'_>) -> rusqlite::Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: row.get(0)?,
        study_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        default_branch_name: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn version_from_row(row: &Row<'_>) -> rusqlite::Result<PromptVersion> {
    let template_variables: Option<String> = row.get(7)?;
    let few_shot_examples: Option<String> = row.get(8)?;
    let output_schema: Option<String> = row.get(9)?;
    let tool_definitions: Option<String> = row.get(10)?;

    Ok(PromptVersion {
        id: row.get(0)?,
        template_id: row.get(1)?,
        version_number: row.get(2)?,
        parent_version_id: row.get(3)?,
        content_hash: ContentHash::from_hex(row.get::<_, String>(4)?),
        payload: PromptPayload {
            system_prompt: row.get(5)?,
            user_prompt_template: row.get(6)?,
            template_variables: parse_or_empty(template_variables.as_deref(), "template_variables"),
            few_shot_examples: parse_or_empty(few_shot_examples.as_deref(), "few_shot_examples"),
            output_schema: parse_optional(output_schema.as_deref(), "output_schema")
                .filter(|value: &serde_json::Value| !value.is_null()),
            tool_definitions: parse_or_empty(tool_definitions.as_deref(), "tool_definitions"),
        },
        message: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
    })
}

pub(crate) fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        template_id: row.get(0)?,
        name: row.get(1)?,
        version_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub(crate) fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<Variant> {
    let examples: Option<String> = row.get(5)?;
    Ok(Variant {
        id: row.get(0)?,
        version_id: row.get(1)?,
        model_config_id: row.get(2)?,
        overrides: VariantOverrides {
            system_prompt_override: row.get(3)?,
            user_prompt_template_override: row.get(4)?,
            few_shot_examples_override: parse_optional(
                examples.as_deref(),
                "few_shot_examples_override",
            ),
        },
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
