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

//! Prompt version-control records
//!
//! Templates own versions; branches and variants point at versions.
//! Versions are immutable once written.

use crate::hash::ContentHash;
use crate::payload::{FewShotExample, PromptPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Branch every template starts with
pub const DEFAULT_BRANCH: &str = "main";

/// Study-scoped container for a versioned prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub study_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Always names an existing branch of this template
    pub default_branch_name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable, content-addressed snapshot of a template's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: String,
    pub template_id: String,
    /// 1-based, unique within the template, never reused
    pub version_number: u32,
    /// `None` only for version 1
    pub parent_version_id: Option<String>,
    pub content_hash: ContentHash,
    #[serde(flatten)]
    pub payload: PromptPayload,
    pub message: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl PromptVersion {
    pub fn is_root(&self) -> bool {
        self.parent_version_id.is_none()
    }
}

/// Named, mutable pointer from a template to one of its versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub template_id: String,
    pub name: String,
    pub version_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Branch listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    #[serde(flatten)]
    pub branch: Branch,
    pub version_number: u32,
    pub is_default: bool,
}

/// Model-specific override layer on top of a single version.
///
/// Variables, output schema and tools are never overridable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub version_id: String,
    pub model_config_id: String,
    #[serde(flatten)]
    pub overrides: VariantOverrides,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantOverrides {
    #[serde(default)]
    pub system_prompt_override: Option<String>,
    #[serde(default)]
    pub user_prompt_template_override: Option<String>,
    #[serde(default)]
    pub few_shot_examples_override: Option<Vec<FewShotExample>>,
}

impl VariantOverrides {
    pub fn is_empty(&self) -> bool {
        self.system_prompt_override.is_none()
            && self.user_prompt_template_override.is_none()
            && self.few_shot_examples_override.is_none()
    }
}

/// Partial variant update. The outer `Option` selects the field, the inner
/// one sets or clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantUpdate {
    pub system_prompt_override: Option<Option<String>>,
    pub user_prompt_template_override: Option<Option<String>>,
    pub few_shot_examples_override: Option<Option<Vec<FewShotExample>>>,
    pub notes: Option<Option<String>>,
}

impl VariantUpdate {
    pub fn is_empty(&self) -> bool {
        self.system_prompt_override.is_none()
            && self.user_prompt_template_override.is_none()
            && self.few_shot_examples_override.is_none()
            && self.notes.is_none()
    }
}

/// Mutable template fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub default_branch_name: Option<String>,
}

/// Model parameters for LLM requests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

/// Study-scoped model configuration owned by the experiment-configuration
/// subsystem. Referenced here by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub study_id: String,
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub parameters: ModelParameters,
}

/// Offset/limit window over a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: u32) -> Self {
        Self { offset: 0, limit }
    }

    /// Clamp the limit into `1..=max`
    pub fn clamped(self, max: u32) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.clamp(1, max.max(1)),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(50)
    }
}
