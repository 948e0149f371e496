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

use crate::diff::{DiffConfig, DiffEngine};
use crate::manager::TemplateManager;
use crate::resolver::PromptResolver;
use promptvc_core::PromptVcConfig;
use promptvc_storage::{
    BranchRegistry, InMemoryModelConfigs, ModelConfigLookup, PromptDatabase, StoreResult,
    TemplateStore, VariantStore, VersionStore,
};
use std::sync::Arc;

/// Every prompt version-control component wired to one database
pub struct PromptRegistry {
    db: Arc<PromptDatabase>,
    templates: Arc<TemplateStore>,
    versions: Arc<VersionStore>,
    branches: Arc<BranchRegistry>,
    variants: Arc<VariantStore>,
    manager: TemplateManager,
    diff: DiffEngine,
    resolver: PromptResolver,
}

impl PromptRegistry {
    /// Open the configured database, serving model configs from the config file
    pub fn open(config: &PromptVcConfig) -> StoreResult<Self> {
        let db = Arc::new(PromptDatabase::open_with_config(&config.storage)?);
        Ok(Self::with_database(db, config, configured_model_configs(config)))
    }

    pub fn in_memory(config: &PromptVcConfig) -> StoreResult<Self> {
        let db = Arc::new(PromptDatabase::open_in_memory()?);
        Ok(Self::with_database(db, config, configured_model_configs(config)))
    }

    pub fn with_database(
        db: Arc<PromptDatabase>,
        config: &PromptVcConfig,
        model_configs: Arc<dyn ModelConfigLookup>,
    ) -> Self {
        let versioning = &config.versioning;
        let templates = Arc::new(TemplateStore::new(db.clone()));
        let versions = Arc::new(
            VersionStore::new(db.clone()).with_max_page_size(versioning.max_page_size),
        );
        let branches = Arc::new(BranchRegistry::new(db.clone()));
        let variants = Arc::new(VariantStore::new(db.clone(), model_configs.clone()));

        let manager = TemplateManager::new(
            templates.clone(),
            versions.clone(),
            versioning.default_branch.clone(),
        );
        let diff = DiffEngine::with_config(
            versions.clone(),
            DiffConfig {
                context_lines: versioning.diff_context_lines,
            },
        );
        let resolver = PromptResolver::new(
            templates.clone(),
            versions.clone(),
            variants.clone(),
            model_configs,
        );

        Self {
            db,
            templates,
            versions,
            branches,
            variants,
            manager,
            diff,
            resolver,
        }
    }

    pub fn database(&self) -> &PromptDatabase {
        &self.db
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn branches(&self) -> &BranchRegistry {
        &self.branches
    }

    pub fn variants(&self) -> &VariantStore {
        &self.variants
    }

    pub fn manager(&self) -> &TemplateManager {
        &self.manager
    }

    pub fn diff(&self) -> &DiffEngine {
        &self.diff
    }

    pub fn resolver(&self) -> &PromptResolver {
        &self.resolver
    }
}

fn configured_model_configs(config: &PromptVcConfig) -> Arc<dyn ModelConfigLookup> {
    Arc::new(InMemoryModelConfigs::from_configs(
        config.model_configs.iter().cloned(),
    ))
}
