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

//! Promptvc Core
//!
//! Data model, payload types, content hashing and configuration for
//! branch-based prompt version control.

pub mod branch_name;
pub mod config;
pub mod hash;
pub mod model;
pub mod payload;

pub use branch_name::{validate_branch_name, BranchNameError};
pub use config::{PromptVcConfig, StorageConfig, VersioningConfig};
pub use hash::{ContentHash, ContentHasher};
pub use model::{
    Branch, BranchInfo, ModelConfig, ModelParameters, Page, PromptTemplate, PromptVersion,
    TemplateUpdate, Variant, VariantOverrides, VariantUpdate, DEFAULT_BRANCH,
};
pub use payload::{
    placeholders, render_template, FewShotExample, PayloadError, PromptPayload, TemplateVariable,
    ToolDefinition, VariableType,
};
