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

//! Prompt Resolver
//!
//! Turns the references a consumer has stored (a version, a variant, a
//! model config, or any mix) into one executable prompt.
//!
//! Precedence, first match wins:
//! - version: explicit id, else the variant's version
//! - model config: explicit id, else the variant's model config
//! - system prompt / user template / few-shot examples: variant override,
//!   else the version
//! - variables, output schema, tools: always the version

use promptvc_core::{
    render_template, ContentHash, FewShotExample, ModelConfig, PayloadError, PromptVersion,
    TemplateVariable, ToolDefinition, Variant,
};
use promptvc_storage::{
    Entity, ModelConfigLookup, StoreError, StoreResult, TemplateStore, VariantStore, VersionStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// References carried by an experiment condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRef {
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub model_config_id: Option<String>,
}

impl ConditionRef {
    pub fn version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            ..Default::default()
        }
    }

    pub fn variant(variant_id: impl Into<String>) -> Self {
        Self {
            variant_id: Some(variant_id.into()),
            ..Default::default()
        }
    }

    pub fn with_model_config(mut self, model_config_id: impl Into<String>) -> Self {
        self.model_config_id = Some(model_config_id.into());
        self
    }
}

/// Field a variant replaced during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    SystemPrompt,
    UserPromptTemplate,
    FewShotExamples,
}

/// A fully resolved prompt, ready for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrompt {
    pub template_id: String,
    pub template_name: String,
    pub version_id: String,
    pub version_number: u32,
    pub content_hash: ContentHash,
    pub variant_id: Option<String>,
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub template_variables: Vec<TemplateVariable>,
    pub few_shot_examples: Vec<FewShotExample>,
    pub output_schema: Option<Value>,
    pub tool_definitions: Vec<ToolDefinition>,
    pub model_config: Option<ModelConfig>,
    pub applied_overrides: Vec<OverrideField>,
}

impl EffectivePrompt {
    /// Fill the effective user prompt template with `values`
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String, PayloadError> {
        render_template(&self.user_prompt_template, &self.template_variables, values)
    }

    /// Fill placeholders in the effective system prompt
    pub fn render_system(&self, values: &HashMap<String, String>) -> Result<String, PayloadError> {
        render_template(&self.system_prompt, &self.template_variables, values)
    }

    pub fn is_overridden(&self, field: OverrideField) -> bool {
        self.applied_overrides.contains(&field)
    }
}

pub struct PromptResolver {
    templates: Arc<TemplateStore>,
    versions: Arc<VersionStore>,
    variants: Arc<VariantStore>,
    model_configs: Arc<dyn ModelConfigLookup>,
}

impl PromptResolver {
    pub fn new(
        templates: Arc<TemplateStore>,
        versions: Arc<VersionStore>,
        variants: Arc<VariantStore>,
        model_configs: Arc<dyn ModelConfigLookup>,
    ) -> Self {
        Self {
            templates,
            versions,
            variants,
            model_configs,
        }
    }

    pub fn resolve(&self, condition: &ConditionRef) -> StoreResult<EffectivePrompt> {
        let variant = match &condition.variant_id {
            Some(id) => Some(self.variants.get_variant_by_id(id)?),
            None => None,
        };

        let version = match (&condition.version_id, &variant) {
            (Some(id), _) => self.versions.get_version_by_id(id)?,
            (None, Some(v)) => self.versions.get_version_by_id(&v.version_id)?,
            (None, None) => {
                debug!("Condition references neither a version nor a variant");
                return Err(StoreError::not_found(Entity::Version, "<none>"));
            }
        };

        if let Some(v) = &variant {
            if v.version_id != version.id {
                warn!(
                    variant_id = %v.id,
                    variant_version = %v.version_id,
                    version_id = %version.id,
                    "Variant belongs to a different version than the explicit one; applying its overrides anyway"
                );
            }
        }

        let template = self.templates.get_template(&version.template_id)?;

        let model_config_id = condition
            .model_config_id
            .as_deref()
            .or_else(|| variant.as_ref().map(|v| v.model_config_id.as_str()));
        let model_config = match model_config_id {
            Some(id) => {
                let found = self.model_configs.get(&template.study_id, id)?;
                if found.is_none() {
                    warn!(model_config_id = id, study_id = %template.study_id, "Model config not found, resolving without one");
                }
                found
            }
            None => None,
        };

        let effective = compose(template.name, version, variant.as_ref(), model_config);
        debug!(
            version_id = %effective.version_id,
            variant_id = ?effective.variant_id,
            overrides = effective.applied_overrides.len(),
            "Resolved prompt"
        );
        Ok(effective)
    }
}

/// Apply a variant's override layer on top of a version
pub fn compose(
    template_name: String,
    version: PromptVersion,
    variant: Option<&Variant>,
    model_config: Option<ModelConfig>,
) -> EffectivePrompt {
    let payload = version.payload;
    let mut applied = Vec::new();

    let mut system_prompt = payload.system_prompt;
    let mut user_prompt_template = payload.user_prompt_template;
    let mut few_shot_examples = payload.few_shot_examples;

    if let Some(overrides) = variant.map(|v| &v.overrides) {
        if let Some(text) = &overrides.system_prompt_override {
            system_prompt = text.clone();
            applied.push(OverrideField::SystemPrompt);
        }
        if let Some(text) = &overrides.user_prompt_template_override {
            user_prompt_template = text.clone();
            applied.push(OverrideField::UserPromptTemplate);
        }
        if let Some(examples) = &overrides.few_shot_examples_override {
            few_shot_examples = examples.clone();
            applied.push(OverrideField::FewShotExamples);
        }
    }

    EffectivePrompt {
        template_id: version.template_id,
        template_name,
        version_id: version.id,
        version_number: version.version_number,
        content_hash: version.content_hash,
        variant_id: variant.map(|v| v.id.clone()),
        system_prompt,
        user_prompt_template,
        template_variables: payload.template_variables,
        few_shot_examples,
        output_schema: payload.output_schema,
        tool_definitions: payload.tool_definitions,
        model_config,
        applied_overrides: applied,
    }
}
