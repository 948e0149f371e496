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

//! Diff Engine
//!
//! Compares two versions of a template field by field. Text fields get a
//! patience line diff (unified patch plus structured hunks); structured
//! fields are only classified as added, removed or modified and reported
//! with their raw before/after values.

use promptvc_core::PromptVersion;
use promptvc_storage::{StoreResult, VersionStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{Algorithm, ChangeTag, TextDiff};
use std::sync::Arc;
use tracing::debug;

/// A contiguous group of changed lines with surrounding context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// Starting line in old content (1-indexed, 0 when the hunk is empty there)
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub header: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub change: LineChange,
    /// Line content without its trailing newline
    pub content: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineChange {
    Context,
    Added,
    Removed,
}

/// Line diff of a text field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChange {
    /// Unified diff
    pub patch: String,
    pub hunks: Vec<DiffHunk>,
    pub lines_added: usize,
    pub lines_removed: usize,
    /// Similarity ratio (0.0 - 1.0)
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// Classified change of a structured field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredChange {
    pub kind: ChangeKind,
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub fields_changed: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

/// Field-by-field comparison of two versions. Unchanged fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub template_id: String,
    pub from_version_id: String,
    pub from_version_number: u32,
    pub to_version_id: String,
    pub to_version_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<TextChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt_template: Option<TextChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_variables: Option<StructuredChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub few_shot_examples: Option<StructuredChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<StructuredChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_definitions: Option<StructuredChange>,
    pub has_changes: bool,
    pub stats: DiffStats,
}

#[derive(Debug, Clone)]
pub struct DiffConfig {
    /// Number of context lines around changes
    pub context_lines: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

pub struct DiffEngine {
    versions: Arc<VersionStore>,
    config: DiffConfig,
}

impl DiffEngine {
    pub fn new(versions: Arc<VersionStore>) -> Self {
        Self::with_config(versions, DiffConfig::default())
    }

    pub fn with_config(versions: Arc<VersionStore>, config: DiffConfig) -> Self {
        Self { versions, config }
    }

    /// Diff two versions of a template by number
    pub fn diff(&self, template_id: &str, from_number: u32, to_number: u32) -> StoreResult<ChangeSet> {
        let from = self.versions.get_version(template_id, from_number)?;
        let to = self.versions.get_version(template_id, to_number)?;
        debug!(template_id, from_number, to_number, "Diffing prompt versions");
        Ok(diff_versions_with(&from, &to, &self.config))
    }

    /// Diff two already loaded versions
    pub fn diff_versions(&self, from: &PromptVersion, to: &PromptVersion) -> ChangeSet {
        diff_versions_with(from, to, &self.config)
    }
}

/// Diff two versions with the default context size
pub fn diff_versions(from: &PromptVersion, to: &PromptVersion) -> ChangeSet {
    diff_versions_with(from, to, &DiffConfig::default())
}

fn diff_versions_with(from: &PromptVersion, to: &PromptVersion, config: &DiffConfig) -> ChangeSet {
    let a = &from.payload;
    let b = &to.payload;

    let system_prompt = diff_text(&a.system_prompt, &b.system_prompt, config.context_lines);
    let user_prompt_template = diff_text(
        &a.user_prompt_template,
        &b.user_prompt_template,
        config.context_lines,
    );
    let template_variables = diff_structured(
        serde_json::to_value(&a.template_variables).unwrap_or(Value::Null),
        serde_json::to_value(&b.template_variables).unwrap_or(Value::Null),
    );
    let few_shot_examples = diff_structured(
        serde_json::to_value(&a.few_shot_examples).unwrap_or(Value::Null),
        serde_json::to_value(&b.few_shot_examples).unwrap_or(Value::Null),
    );
    let output_schema = diff_structured(
        a.output_schema.clone().unwrap_or(Value::Null),
        b.output_schema.clone().unwrap_or(Value::Null),
    );
    let tool_definitions = diff_structured(
        serde_json::to_value(&a.tool_definitions).unwrap_or(Value::Null),
        serde_json::to_value(&b.tool_definitions).unwrap_or(Value::Null),
    );

    let texts = [&system_prompt, &user_prompt_template];
    let structured = [
        &template_variables,
        &few_shot_examples,
        &output_schema,
        &tool_definitions,
    ];
    let stats = DiffStats {
        fields_changed: texts.iter().filter(|c| c.is_some()).count()
            + structured.iter().filter(|c| c.is_some()).count(),
        lines_added: texts.iter().copied().flatten().map(|c| c.lines_added).sum(),
        lines_removed: texts.iter().copied().flatten().map(|c| c.lines_removed).sum(),
    };

    ChangeSet {
        template_id: to.template_id.clone(),
        from_version_id: from.id.clone(),
        from_version_number: from.version_number,
        to_version_id: to.id.clone(),
        to_version_number: to.version_number,
        system_prompt,
        user_prompt_template,
        template_variables,
        few_shot_examples,
        output_schema,
        tool_definitions,
        has_changes: stats.fields_changed > 0,
        stats,
    }
}

/// Line diff of two texts; `None` when byte-identical
pub fn diff_text(old_text: &str, new_text: &str, context_lines: usize) -> Option<TextChange> {
    if old_text == new_text {
        return None;
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Patience)
        .diff_lines(old_text, new_text);

    let mut hunks = Vec::new();
    let mut lines_added = 0;
    let mut lines_removed = 0;

    for group in diff.grouped_ops(context_lines) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let mut lines = Vec::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                let change_type = match change.tag() {
                    ChangeTag::Equal => LineChange::Context,
                    ChangeTag::Insert => {
                        lines_added += 1;
                        LineChange::Added
                    }
                    ChangeTag::Delete => {
                        lines_removed += 1;
                        LineChange::Removed
                    }
                };
                lines.push(DiffLine {
                    change: change_type,
                    content: change.value().trim_end_matches('\n').to_string(),
                    old_line: change.old_index().map(|i| i + 1),
                    new_line: change.new_index().map(|i| i + 1),
                });
            }
        }

        let old_count = old_range.len();
        let new_count = new_range.len();
        let old_start = hunk_start(old_range.start, old_count);
        let new_start = hunk_start(new_range.start, new_count);
        hunks.push(DiffHunk {
            old_start,
            old_count,
            new_start,
            new_count,
            header: format!("@@ -{},{} +{},{} @@", old_start, old_count, new_start, new_count),
            lines,
        });
    }

    let patch = diff
        .unified_diff()
        .context_radius(context_lines)
        .header("before", "after")
        .to_string();

    Some(TextChange {
        patch,
        hunks,
        lines_added,
        lines_removed,
        similarity: diff.ratio() as f64,
    })
}

// Unified diff convention: an empty range starts at the preceding line
fn hunk_start(index: usize, count: usize) -> usize {
    if count == 0 {
        index
    } else {
        index + 1
    }
}

/// Classify a structured field change; `None` when serialized forms match
pub fn diff_structured(before: Value, after: Value) -> Option<StructuredChange> {
    if before == after {
        return None;
    }

    let kind = match (is_empty_value(&before), is_empty_value(&after)) {
        (true, false) => ChangeKind::Added,
        (false, true) => ChangeKind::Removed,
        _ => ChangeKind::Modified,
    };
    Some(StructuredChange {
        kind,
        before,
        after,
    })
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
