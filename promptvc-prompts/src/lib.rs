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

//! Promptvc Prompts
//!
//! Higher-level prompt version control on top of the store: diffs between
//! versions, resolution of experiment conditions into executable prompts,
//! and template lifecycle orchestration.

pub mod diff;
pub mod manager;
pub mod registry;
pub mod resolver;

pub use diff::{
    diff_versions, ChangeKind, ChangeSet, DiffConfig, DiffEngine, DiffHunk, DiffLine, DiffStats,
    LineChange, StructuredChange, TextChange,
};
pub use manager::TemplateManager;
pub use registry::PromptRegistry;
pub use resolver::{compose, ConditionRef, EffectivePrompt, OverrideField, PromptResolver};
