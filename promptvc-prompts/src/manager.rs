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

//! Template Manager
//!
//! Thin orchestration over the stores for template lifecycle and commits.
//! Carries the configured default branch so callers never pick one ad hoc.

use promptvc_core::{PromptPayload, PromptTemplate, PromptVersion, TemplateUpdate};
use promptvc_storage::{
    CreatedTemplate, NewTemplate, NewVersion, StoreResult, TemplateStore, VersionStore,
};
use std::sync::Arc;
use tracing::info;

pub struct TemplateManager {
    templates: Arc<TemplateStore>,
    versions: Arc<VersionStore>,
    default_branch: String,
}

impl TemplateManager {
    pub fn new(
        templates: Arc<TemplateStore>,
        versions: Arc<VersionStore>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            versions,
            default_branch: default_branch.into(),
        }
    }

    /// Create a template with its first version on the default branch
    pub fn create_template(
        &self,
        study_id: &str,
        name: &str,
        description: Option<String>,
        initial_payload: PromptPayload,
        message: Option<String>,
        created_by: &str,
    ) -> StoreResult<CreatedTemplate> {
        let mut new = NewTemplate::new(study_id, name, created_by)
            .with_default_branch(self.default_branch.clone());
        new.description = description;
        self.templates.create_template(new, initial_payload, message)
    }

    pub fn update_template(
        &self,
        template_id: &str,
        update: TemplateUpdate,
    ) -> StoreResult<PromptTemplate> {
        self.templates.update_template(template_id, update)
    }

    pub fn delete_template(&self, template_id: &str) -> StoreResult<()> {
        self.templates.delete_template(template_id)?;
        info!(template_id, "Template and all of its history removed");
        Ok(())
    }

    pub fn get_template(&self, template_id: &str) -> StoreResult<PromptTemplate> {
        self.templates.get_template(template_id)
    }

    pub fn list_templates(&self, study_id: &str) -> StoreResult<Vec<PromptTemplate>> {
        self.templates.list_templates(study_id)
    }

    /// Commit new content, optionally to a named branch
    pub fn commit(
        &self,
        template_id: &str,
        payload: PromptPayload,
        branch: Option<&str>,
        message: Option<String>,
        created_by: &str,
    ) -> StoreResult<PromptVersion> {
        let mut new = NewVersion::new(payload, created_by);
        new.branch = branch.map(str::to_string);
        new.message = message;
        self.versions.create_version(template_id, new)
    }
}
