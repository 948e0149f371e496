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

//! Promptvc Storage
//!
//! SQLite-backed persistence for prompt templates, immutable versions,
//! movable branches and per-model-config variants.
//!
//! ```text
//! template ──< version (number, parent, content hash)
//!    │            ▲        └──< variant (model config overrides)
//!    └──< branch ─┘
//! ```

pub mod branches;
mod codec;
pub mod db;
pub mod error;
pub mod model_config;
pub mod templates;
pub mod variants;
pub mod versions;

pub use branches::BranchRegistry;
pub use db::{PromptDatabase, SCHEMA_VERSION};
pub use error::{Entity, ErrorKind, StoreError, StoreResult};
pub use model_config::{InMemoryModelConfigs, ModelConfigLookup};
pub use templates::{CreatedTemplate, NewTemplate, TemplateStore};
pub use variants::{VariantFilter, VariantStore};
pub use versions::{NewVersion, VersionRef, VersionStore};
