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

//! End-to-end tests through the registry facade

use promptvc_core::{
    FewShotExample, ModelConfig, ModelParameters, PromptPayload, PromptVcConfig, TemplateUpdate,
    TemplateVariable, ToolDefinition, VariableType, VariantOverrides,
};
use promptvc_prompts::{ChangeKind, ConditionRef, OverrideField, PromptRegistry};
use promptvc_storage::{Entity, ErrorKind, StoreError};
use serde_json::json;
use std::collections::HashMap;

fn config() -> PromptVcConfig {
    let mut config = PromptVcConfig::default();
    config.model_configs = vec![ModelConfig {
        id: "mc-1".to_string(),
        study_id: "study-1".to_string(),
        name: "Fast".to_string(),
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
        parameters: ModelParameters {
            temperature: Some(0.0),
            max_tokens: Some(256),
            ..Default::default()
        },
    }];
    config
}

fn p1() -> PromptPayload {
    PromptPayload::new("You are a helpful grader.", "Grade this answer:\n{{answer}}\n")
        .with_variable(TemplateVariable::new("answer", VariableType::String).required())
        .with_example(FewShotExample::new("2+2=4", "correct"))
}

fn p2() -> PromptPayload {
    PromptPayload::new(
        "You are a strict grader.",
        "Grade this answer:\n{{answer}}\nExplain briefly.\n",
    )
    .with_variable(TemplateVariable::new("answer", VariableType::String).required())
    .with_example(FewShotExample::new("2+2=4", "correct"))
    .with_output_schema(json!({"type": "object", "required": ["grade"]}))
}

#[test]
fn test_branching_scenario() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let created = registry
        .manager()
        .create_template("study-1", "grader", None, p1(), None, "alice")
        .unwrap();
    let tid = created.template.id.clone();
    assert_eq!(created.version.version_number, 1);
    assert!(created.version.parent_version_id.is_none());
    assert_eq!(created.branch.name, "main");

    let v2 = registry
        .manager()
        .commit(&tid, p2(), None, Some("stricter".into()), "alice")
        .unwrap();
    assert_eq!(v2.version_number, 2);
    let tip = registry.versions().latest_on_branch(&tid, "main").unwrap().unwrap();
    assert_eq!(tip.id, v2.id);

    let err = registry
        .manager()
        .commit(&tid, p2(), None, None, "bob")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!err.is_retryable());
    assert!(matches!(
        err,
        StoreError::DuplicateContent { version_number: 2, .. }
    ));

    let experimental = registry
        .branches()
        .create_branch(&tid, "experimental", Some(created.version.id.as_str()))
        .unwrap();
    assert_eq!(experimental.version_id, created.version.id);
    assert_eq!(registry.branches().get_branch(&tid, "main").unwrap().version_id, v2.id);

    let changes = registry.diff().diff(&tid, 1, 2).unwrap();
    assert!(changes.has_changes);
    assert!(changes.system_prompt.is_some());
    assert!(changes.user_prompt_template.is_some());
    assert!(changes.template_variables.is_none());
    assert!(changes.few_shot_examples.is_none());
    assert_eq!(changes.output_schema.as_ref().map(|c| c.kind), Some(ChangeKind::Added));
    assert_eq!(changes.stats.fields_changed, 3);
}

#[test]
fn test_diff_with_self_is_empty() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let created = registry
        .manager()
        .create_template("study-1", "grader", None, p1(), None, "alice")
        .unwrap();

    let changes = registry.diff().diff(&created.template.id, 1, 1).unwrap();
    assert!(!changes.has_changes);
    assert_eq!(changes.stats.fields_changed, 0);
    assert!(changes.system_prompt.is_none() && changes.output_schema.is_none());

    let err = registry.diff().diff(&created.template.id, 1, 7).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_diff_tool_removal() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let with_tool = p1().with_tool(ToolDefinition {
        name: "lookup".into(),
        description: "Look up a rubric".into(),
        parameters: json!({"type": "object"}),
    });
    let created = registry
        .manager()
        .create_template("study-1", "tools", None, with_tool, None, "alice")
        .unwrap();
    let tid = created.template.id;
    registry.manager().commit(&tid, p1(), None, None, "alice").unwrap();

    let changes = registry.diff().diff(&tid, 1, 2).unwrap();
    let tools = changes.tool_definitions.unwrap();
    assert_eq!(tools.kind, ChangeKind::Removed);
    assert_eq!(tools.after, json!([]));
    assert!(changes.system_prompt.is_none());
}

#[test]
fn test_resolve_version_only_round_trips() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let created = registry
        .manager()
        .create_template("study-1", "grader", None, p2(), None, "alice")
        .unwrap();
    let version = created.version;

    let effective = registry
        .resolver()
        .resolve(&ConditionRef::version(version.id.clone()))
        .unwrap();
    assert_eq!(effective.system_prompt, version.payload.system_prompt);
    assert_eq!(effective.user_prompt_template, version.payload.user_prompt_template);
    assert_eq!(effective.template_variables, version.payload.template_variables);
    assert_eq!(effective.few_shot_examples, version.payload.few_shot_examples);
    assert_eq!(effective.output_schema, version.payload.output_schema);
    assert_eq!(effective.tool_definitions, version.payload.tool_definitions);
    assert_eq!(effective.content_hash, version.content_hash);
    assert!(effective.model_config.is_none());
    assert!(effective.variant_id.is_none());
    assert_eq!(effective.template_name, "grader");
}

#[test]
fn test_resolve_variant_precedence() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let created = registry
        .manager()
        .create_template("study-1", "grader", None, p1(), None, "alice")
        .unwrap();
    let tid = created.template.id.clone();
    let v1 = created.version;

    let variant = registry
        .variants()
        .create_variant(
            &tid,
            &v1.id,
            "mc-1",
            VariantOverrides {
                system_prompt_override: Some("B".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let effective = registry
        .resolver()
        .resolve(&ConditionRef::variant(variant.id.clone()))
        .unwrap();
    assert_eq!(effective.system_prompt, "B");
    assert_eq!(effective.user_prompt_template, v1.payload.user_prompt_template);
    assert_eq!(effective.few_shot_examples, v1.payload.few_shot_examples);
    assert_eq!(effective.version_id, v1.id);
    assert_eq!(effective.applied_overrides, vec![OverrideField::SystemPrompt]);
    let model = effective.model_config.as_ref().unwrap();
    assert_eq!(model.id, "mc-1");
    assert_eq!(model.parameters.max_tokens, Some(256));

    let values = HashMap::from([("answer".to_string(), "42".to_string())]);
    assert_eq!(effective.render(&values).unwrap(), "Grade this answer:\n42\n");

    // Explicit version wins, the variant's overrides still apply
    let v2 = registry.manager().commit(&tid, p2(), None, None, "alice").unwrap();
    let mixed = registry
        .resolver()
        .resolve(&ConditionRef {
            version_id: Some(v2.id.clone()),
            variant_id: Some(variant.id.clone()),
            model_config_id: Some("unknown-config".into()),
        })
        .unwrap();
    assert_eq!(mixed.version_id, v2.id);
    assert_eq!(mixed.system_prompt, "B");
    assert_eq!(mixed.user_prompt_template, v2.payload.user_prompt_template);
    assert!(mixed.model_config.is_none());
}

#[test]
fn test_resolve_requires_a_version() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();

    let err = registry.resolver().resolve(&ConditionRef::default()).unwrap_err();
    match err {
        StoreError::NotFound { entity, id } => {
            assert_eq!(entity, Entity::Version);
            assert_eq!(id, "<none>");
        }
        other => panic!("expected not found, got {other:?}"),
    }

    let err = registry
        .resolver()
        .resolve(&ConditionRef::variant("missing"))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: Entity::Variant, .. }));
}

#[test]
fn test_default_branch_handover() {
    let registry = PromptRegistry::in_memory(&config()).unwrap();
    let created = registry
        .manager()
        .create_template("study-1", "grader", Some("rubric grader".into()), p1(), None, "alice")
        .unwrap();
    let tid = created.template.id;

    let err = registry.branches().delete_branch(&tid, "main").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    registry.branches().create_branch(&tid, "stable", None).unwrap();
    registry
        .manager()
        .update_template(
            &tid,
            TemplateUpdate {
                default_branch_name: Some("stable".into()),
                ..Default::default()
            },
        )
        .unwrap();
    registry.branches().delete_branch(&tid, "main").unwrap();

    let branches = registry.branches().list_branches(&tid).unwrap();
    assert_eq!(branches.len(), 1);
    assert!(branches[0].is_default);

    registry.manager().delete_template(&tid).unwrap();
    assert!(registry.manager().list_templates("study-1").unwrap().is_empty());
}

#[test]
fn test_configured_default_branch_and_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.storage.database_path = dir.path().join("db").join("prompts.db");
    config.versioning.default_branch = "trunk".to_string();

    let tid = {
        let registry = PromptRegistry::open(&config).unwrap();
        let created = registry
            .manager()
            .create_template("study-1", "grader", None, p1(), None, "alice")
            .unwrap();
        assert_eq!(created.template.default_branch_name, "trunk");
        created.template.id
    };

    let registry = PromptRegistry::open(&config).unwrap();
    let template = registry.manager().get_template(&tid).unwrap();
    assert_eq!(template.default_branch_name, "trunk");
    assert!(registry.versions().latest_on_branch(&tid, "trunk").unwrap().is_some());
    assert!(registry.database().path().is_some());
}
