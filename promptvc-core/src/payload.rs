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

//! Prompt payload types
//!
//! The semantic content of one prompt version: system instructions, a
//! parameterized user prompt, the variables it declares, few-shot examples,
//! an optional output schema and tool definitions. Everything in here feeds
//! the content hash, so the field set is fixed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while validating or rendering a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("template variable name cannot be empty")]
    EmptyVariableName,

    #[error("template variable declared twice: {0}")]
    DuplicateVariable(String),

    #[error("tool definition name cannot be empty")]
    EmptyToolName,

    #[error("tool defined twice: {0}")]
    DuplicateTool(String),

    #[error("missing value for required variable: {0}")]
    MissingVariable(String),
}

/// Variable type, mirrors what the researcher UI can collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Enum,
    Json,
}

/// A named, typed placeholder of the user prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Allowed values for `Enum` variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl TemplateVariable {
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            description: None,
            required: false,
            default_value: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// One demonstration pair shown to the model before the real input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl FewShotExample {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            explanation: None,
        }
    }
}

/// Function-calling tool exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool arguments
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// The hashed, immutable content of a prompt version
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PromptPayload {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt_template: String,
    #[serde(default)]
    pub template_variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub few_shot_examples: Vec<FewShotExample>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_definitions: Vec<ToolDefinition>,
}

impl PromptPayload {
    pub fn new(system_prompt: impl Into<String>, user_prompt_template: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt_template: user_prompt_template.into(),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, variable: TemplateVariable) -> Self {
        self.template_variables.push(variable);
        self
    }

    pub fn with_example(mut self, example: FewShotExample) -> Self {
        self.few_shot_examples.push(example);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tool_definitions.push(tool);
        self
    }

    /// Reject payloads whose variables or tools cannot be addressed by name
    pub fn validate(&self) -> Result<(), PayloadError> {
        let mut seen = HashSet::new();
        for variable in &self.template_variables {
            if variable.name.trim().is_empty() {
                return Err(PayloadError::EmptyVariableName);
            }
            if !seen.insert(variable.name.as_str()) {
                return Err(PayloadError::DuplicateVariable(variable.name.clone()));
            }
        }

        let mut seen = HashSet::new();
        for tool in &self.tool_definitions {
            if tool.name.trim().is_empty() {
                return Err(PayloadError::EmptyToolName);
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(PayloadError::DuplicateTool(tool.name.clone()));
            }
        }

        Ok(())
    }

    /// `{{name}}` placeholders of the user prompt template, in order of first use
    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.user_prompt_template)
    }

    /// Placeholders used by the template with no matching declared variable
    pub fn undeclared_placeholders(&self) -> Vec<String> {
        let declared: HashSet<&str> = self
            .template_variables
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        self.placeholders()
            .into_iter()
            .filter(|name| !declared.contains(name.as_str()))
            .collect()
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Extract distinct placeholder names from a template
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Substitute `{{name}}` placeholders.
///
/// Supplied values win, then declared defaults. Declared optional variables
/// without either render as an empty string. Placeholders that are neither
/// declared nor supplied are left verbatim.
pub fn render_template(
    template: &str,
    variables: &[TemplateVariable],
    values: &HashMap<String, String>,
) -> Result<String, PayloadError> {
    for variable in variables {
        if variable.required
            && variable.default_value.is_none()
            && !values.contains_key(&variable.name)
        {
            return Err(PayloadError::MissingVariable(variable.name.clone()));
        }
    }

    let declared: HashMap<&str, &TemplateVariable> =
        variables.iter().map(|v| (v.name.as_str(), v)).collect();

    let rendered = placeholder_regex().replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if let Some(value) = values.get(name) {
            return value.clone();
        }
        match declared.get(name) {
            Some(variable) => variable.default_value.clone().unwrap_or_default(),
            None => caps[0].to_string(),
        }
    });

    Ok(rendered.into_owned())
}
