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

//! Model configuration lookup
//!
//! Model configs are owned outside the prompt store. Variants and the
//! resolver only need to ask "does this config exist for this study".

use crate::error::StoreResult;
use parking_lot::RwLock;
use promptvc_core::ModelConfig;
use std::collections::HashMap;

/// Read-only access to externally managed model configs
pub trait ModelConfigLookup: Send + Sync {
    /// Fetch a config scoped to `study_id`; `Ok(None)` when unknown
    fn get(&self, study_id: &str, id: &str) -> StoreResult<Option<ModelConfig>>;
}

/// In-process registry, populated from configuration or tests
#[derive(Default)]
pub struct InMemoryModelConfigs {
    configs: RwLock<HashMap<String, ModelConfig>>,
}

impl InMemoryModelConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ModelConfig>) -> Self {
        let map = configs.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            configs: RwLock::new(map),
        }
    }

    pub fn insert(&self, config: ModelConfig) {
        self.configs.write().insert(config.id.clone(), config);
    }

    pub fn remove(&self, id: &str) -> Option<ModelConfig> {
        self.configs.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

impl ModelConfigLookup for InMemoryModelConfigs {
    fn get(&self, study_id: &str, id: &str) -> StoreResult<Option<ModelConfig>> {
        Ok(self
            .configs
            .read()
            .get(id)
            .filter(|c| c.study_id == study_id)
            .cloned())
    }
}
