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

//! Integration tests for the prompt store

use promptvc_core::{
    ContentHasher, FewShotExample, ModelConfig, ModelParameters, Page, PromptPayload,
    TemplateUpdate, TemplateVariable, VariableType, VariantOverrides, VariantUpdate,
};
use promptvc_storage::{
    BranchRegistry, CreatedTemplate, Entity, ErrorKind, InMemoryModelConfigs, NewTemplate,
    NewVersion, PromptDatabase, StoreError, TemplateStore, VariantFilter, VariantStore,
    VersionStore,
};
use std::sync::Arc;

struct Stores {
    db: Arc<PromptDatabase>,
    templates: TemplateStore,
    versions: VersionStore,
    branches: BranchRegistry,
    variants: VariantStore,
}

fn stores() -> Stores {
    let db = Arc::new(PromptDatabase::open_in_memory().unwrap());
    stores_on(db)
}

fn stores_on(db: Arc<PromptDatabase>) -> Stores {
    let configs = Arc::new(InMemoryModelConfigs::from_configs(vec![
        model_config("mc-gpt", "study-1"),
        model_config("mc-claude", "study-1"),
        model_config("mc-other", "study-2"),
    ]));
    Stores {
        templates: TemplateStore::new(db.clone()),
        versions: VersionStore::new(db.clone()),
        branches: BranchRegistry::new(db.clone()),
        variants: VariantStore::new(db.clone(), configs),
        db,
    }
}

fn model_config(id: &str, study: &str) -> ModelConfig {
    ModelConfig {
        id: id.to_string(),
        study_id: study.to_string(),
        name: id.to_string(),
        provider: "test".to_string(),
        model: "test-model".to_string(),
        parameters: ModelParameters {
            temperature: Some(0.2),
            ..Default::default()
        },
    }
}

fn payload(system: &str) -> PromptPayload {
    PromptPayload::new(system, "Answer: {{question}}")
        .with_variable(TemplateVariable::new("question", VariableType::String).required())
}

fn create(stores: &Stores, system: &str) -> CreatedTemplate {
    stores
        .templates
        .create_template(
            NewTemplate::new("study-1", "support-bot", "alice"),
            payload(system),
            Some("initial".to_string()),
        )
        .unwrap()
}

/// Walk through create, commit, branch, diverge and protect the default branch
#[test]
fn test_version_lifecycle() {
    let s = stores();
    let created = create(&s, "A");
    let tid = created.template.id.clone();

    assert_eq!(created.version.version_number, 1);
    assert!(created.version.is_root());
    assert_eq!(created.branch.name, "main");
    assert_eq!(created.template.default_branch_name, "main");
    assert_eq!(
        created.version.content_hash,
        ContentHasher::hash(&payload("A"))
    );

    // Parent defaults to the branch tip
    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("B"), "alice"))
        .unwrap();
    assert_eq!(v2.version_number, 2);
    assert_eq!(v2.parent_version_id.as_deref(), Some(created.version.id.as_str()));
    assert_eq!(
        s.versions.latest_on_branch(&tid, "main").unwrap().unwrap().id,
        v2.id
    );

    // Identical content is rejected with the existing number
    let err = s
        .versions
        .create_version(&tid, NewVersion::new(payload("A"), "bob"))
        .unwrap_err();
    match err {
        StoreError::DuplicateContent { version_number, version_id } => {
            assert_eq!(version_number, 1);
            assert_eq!(version_id, created.version.id);
        }
        other => panic!("expected duplicate content, got {other:?}"),
    }
    assert_eq!(s.versions.count_versions(&tid).unwrap(), 2);

    // Branch from the default branch, then diverge
    let exp = s.branches.create_branch(&tid, "exp", None).unwrap();
    assert_eq!(exp.version_id, v2.id);

    let v3 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("C"), "alice").on_branch("exp"))
        .unwrap();
    assert_eq!(v3.version_number, 3);
    assert_eq!(v3.parent_version_id.as_deref(), Some(v2.id.as_str()));
    assert_eq!(s.branches.get_branch(&tid, "exp").unwrap().version_id, v3.id);
    assert_eq!(s.branches.get_branch(&tid, "main").unwrap().version_id, v2.id);

    // Default branch is protected
    let err = s.branches.delete_branch(&tid, "main").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    s.branches.delete_branch(&tid, "exp").unwrap();
    assert!(s.versions.latest_on_branch(&tid, "exp").unwrap().is_none());

    let err = s.branches.delete_branch(&tid, "exp").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_list_versions_newest_first() {
    let s = stores();
    let tid = create(&s, "v1").template.id;
    for i in 2..=5 {
        s.versions
            .create_version(&tid, NewVersion::new(payload(&format!("v{i}")), "alice"))
            .unwrap();
    }

    let all = s.versions.list_versions(&tid, Page::first(50)).unwrap();
    let numbers: Vec<u32> = all.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![5, 4, 3, 2, 1]);

    let page = s.versions.list_versions(&tid, Page::new(1, 2)).unwrap();
    let numbers: Vec<u32> = page.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![4, 3]);

    let by_number = s.versions.get_version(&tid, 3u32).unwrap();
    assert_eq!(by_number.payload.system_prompt, "v3");
    let by_id = s.versions.get_version(&tid, by_number.id.as_str()).unwrap();
    assert_eq!(by_id, by_number);

    assert!(s.versions.get_version(&tid, 99u32).unwrap_err().is_not_found());
    assert!(s
        .versions
        .list_versions("missing", Page::default())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_history_and_ancestry() {
    let s = stores();
    let created = create(&s, "root");
    let tid = created.template.id.clone();

    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("two"), "alice"))
        .unwrap();
    // Sibling of v2, explicitly parented on v1
    let side = s
        .versions
        .create_version(
            &tid,
            NewVersion::new(payload("side"), "alice")
                .with_parent(created.version.id.clone())
                .on_branch("side"),
        )
        .unwrap();

    let chain = s.versions.history(&tid, &side.id, None).unwrap();
    let numbers: Vec<u32> = chain.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![3, 1]);

    let limited = s.versions.history(&tid, &side.id, Some(1)).unwrap();
    assert_eq!(limited.len(), 1);

    assert!(s.versions.is_ancestor(&tid, &created.version.id, &v2.id).unwrap());
    assert!(!s.versions.is_ancestor(&tid, &v2.id, &side.id).unwrap());
    assert!(s.versions.is_ancestor(&tid, &side.id, &side.id).unwrap());
}

#[test]
fn test_explicit_parent_must_belong_to_template() {
    let s = stores();
    let first = create(&s, "one");
    let second = create(&s, "two");

    let err = s
        .versions
        .create_version(
            &first.template.id,
            NewVersion::new(payload("three"), "alice").with_parent(second.version.id.clone()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound { entity: Entity::Version, .. }
    ));
}

#[test]
fn test_same_content_allowed_across_templates() {
    let s = stores();
    let first = create(&s, "shared");
    let second = create(&s, "shared");
    assert_eq!(first.version.content_hash, second.version.content_hash);
    assert_eq!(second.version.version_number, 1);

    let found = s
        .versions
        .find_by_content_hash(&second.template.id, &second.version.content_hash)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, second.version.id);
}

#[test]
fn test_branch_rules() {
    let s = stores();
    let a = create(&s, "a");
    let b = create(&s, "b");
    let tid = a.template.id.clone();

    let err = s.branches.create_branch(&tid, "main", None).unwrap_err();
    assert!(matches!(
        err,
        StoreError::AlreadyExists { entity: Entity::Branch, .. }
    ));

    let err = s.branches.create_branch(&tid, "bad..name", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // Branch targets cannot cross templates
    let err = s
        .branches
        .create_branch(&tid, "foreign", Some(b.version.id.as_str()))
        .unwrap_err();
    assert!(err.is_not_found());
    let err = s.branches.move_branch(&tid, "main", &b.version.id).unwrap_err();
    assert!(err.is_not_found());

    let err = s.branches.move_branch(&tid, "ghost", &a.version.id).unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound { entity: Entity::Branch, .. }
    ));

    // Moves are unconditional, including backwards
    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("a2"), "alice"))
        .unwrap();
    let moved = s.branches.move_branch(&tid, "main", &a.version.id).unwrap();
    assert_eq!(moved.version_id, a.version.id);
    let moved = s.branches.upsert_branch(&tid, "main", &v2.id).unwrap();
    assert_eq!(moved.version_id, v2.id);

    s.branches.create_branch(&tid, "release", Some(a.version.id.as_str())).unwrap();
    let listed = s.branches.list_branches(&tid).unwrap();
    let summary: Vec<(&str, u32, bool)> = listed
        .iter()
        .map(|b| (b.branch.name.as_str(), b.version_number, b.is_default))
        .collect();
    assert_eq!(summary, vec![("main", 2, true), ("release", 1, false)]);
}

#[test]
fn test_update_template_default_branch() {
    let s = stores();
    let tid = create(&s, "x").template.id;

    let err = s
        .templates
        .update_template(
            &tid,
            TemplateUpdate {
                default_branch_name: Some("prod".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    s.branches.create_branch(&tid, "prod", None).unwrap();
    let updated = s
        .templates
        .update_template(
            &tid,
            TemplateUpdate {
                name: Some("renamed".to_string()),
                description: Some(Some("now with a description".to_string())),
                default_branch_name: Some("prod".to_string()),
            },
        )
        .unwrap();
    assert_eq!(updated.default_branch_name, "prod");
    assert_eq!(updated.name, "renamed");

    // The old default can now be deleted, the new one cannot
    s.branches.delete_branch(&tid, "main").unwrap();
    assert_eq!(
        s.branches.delete_branch(&tid, "prod").unwrap_err().kind(),
        ErrorKind::InvalidInput
    );

    // Commits without a branch go to the new default
    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("y"), "alice"))
        .unwrap();
    assert_eq!(s.branches.get_branch(&tid, "prod").unwrap().version_id, v2.id);
}

#[test]
fn test_variants() {
    let s = stores();
    let created = create(&s, "base");
    let tid = created.template.id.clone();
    let vid = created.version.id.clone();

    let overrides = VariantOverrides {
        system_prompt_override: Some("tuned for gpt".to_string()),
        ..Default::default()
    };
    let variant = s
        .variants
        .create_variant(&tid, &vid, "mc-gpt", overrides.clone(), None)
        .unwrap();
    assert_eq!(variant.overrides, overrides);

    let err = s
        .variants
        .create_variant(&tid, &vid, "mc-gpt", VariantOverrides::default(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::AlreadyExists { entity: Entity::Variant, .. }
    ));

    // Model config from another study
    let err = s
        .variants
        .create_variant(&tid, &vid, "mc-other", VariantOverrides::default(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound { entity: Entity::ModelConfig, .. }
    ));

    let other = create(&s, "elsewhere");
    let err = s
        .variants
        .create_variant(&tid, &other.version.id, "mc-claude", VariantOverrides::default(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound { entity: Entity::Version, .. }
    ));

    s.variants
        .create_variant(&tid, &vid, "mc-claude", VariantOverrides::default(), Some("plain".into()))
        .unwrap();

    let updated = s
        .variants
        .update_variant(
            &tid,
            &variant.id,
            VariantUpdate {
                system_prompt_override: Some(None),
                few_shot_examples_override: Some(Some(vec![FewShotExample::new("q", "a")])),
                notes: Some(Some("cleared system".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(updated.overrides.system_prompt_override.is_none());
    assert_eq!(
        updated.overrides.few_shot_examples_override,
        Some(vec![FewShotExample::new("q", "a")])
    );
    assert_eq!(s.variants.get_variant(&tid, &variant.id).unwrap(), updated);
    assert!(s
        .variants
        .get_variant(&other.template.id, &variant.id)
        .unwrap_err()
        .is_not_found());

    assert_eq!(
        s.variants.list_variants(&tid, &VariantFilter::default()).unwrap().len(),
        2
    );
    let gpt_only = s
        .variants
        .list_variants(&tid, &VariantFilter::for_model_config("mc-gpt"))
        .unwrap();
    assert_eq!(gpt_only.len(), 1);
    assert_eq!(gpt_only[0].id, variant.id);

    s.variants.delete_variant(&tid, &variant.id).unwrap();
    assert!(s.variants.get_variant_by_id(&variant.id).unwrap_err().is_not_found());
}

#[test]
fn test_delete_template_cascades() {
    let s = stores();
    let created = create(&s, "doomed");
    let tid = created.template.id.clone();
    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("doomed 2"), "alice").on_branch("dev"))
        .unwrap();
    let variant = s
        .variants
        .create_variant(&tid, &v2.id, "mc-gpt", VariantOverrides::default(), None)
        .unwrap();
    let survivor = create(&s, "survivor");

    s.templates.delete_template(&tid).unwrap();

    assert!(s.templates.get_template(&tid).unwrap_err().is_not_found());
    assert!(s.versions.get_version_by_id(&v2.id).unwrap_err().is_not_found());
    assert!(s.variants.get_variant_by_id(&variant.id).unwrap_err().is_not_found());
    assert!(s.branches.list_branches(&tid).unwrap_err().is_not_found());
    assert!(s.templates.delete_template(&tid).unwrap_err().is_not_found());

    let remaining = s.templates.list_templates("study-1").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, survivor.template.id);
}

#[test]
fn test_template_creation_is_atomic() {
    let s = stores();
    let err = s
        .templates
        .create_template(
            NewTemplate::new("study-1", "broken", "alice").with_default_branch("no spaces"),
            payload("x"),
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let invalid_payload = PromptPayload::new("x", "y")
        .with_variable(TemplateVariable::new("dup", VariableType::String))
        .with_variable(TemplateVariable::new("dup", VariableType::Number));
    let err = s
        .templates
        .create_template(NewTemplate::new("study-1", "broken", "alice"), invalid_payload, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert!(s.templates.list_templates("study-1").unwrap().is_empty());
}

#[test]
fn test_concurrent_commits_get_distinct_numbers() {
    let s = stores();
    let tid = create(&s, "seed").template.id;
    let db = s.db.clone();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = db.clone();
            let tid = tid.clone();
            std::thread::spawn(move || {
                VersionStore::new(db)
                    .create_version(&tid, NewVersion::new(payload(&format!("t{i}")), "worker"))
                    .map(|v| v.version_number)
            })
        })
        .collect();

    let mut numbers: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (2..=9).collect::<Vec<_>>());
}

#[test]
fn test_corrupt_stored_json_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompts.db");

    let (tid, vid) = {
        let s = stores_on(Arc::new(PromptDatabase::open(&path).unwrap()));
        let created = create(&s, "fragile");
        (created.template.id, created.version.id)
    };

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE prompt_versions SET template_variables = '{oops', output_schema = 'nope' \
             WHERE id = ?1",
            [&vid],
        )
        .unwrap();
    }

    let s = stores_on(Arc::new(PromptDatabase::open(&path).unwrap()));
    let version = s.versions.get_version(&tid, vid.as_str()).unwrap();
    assert!(version.payload.template_variables.is_empty());
    assert!(version.payload.output_schema.is_none());
    assert_eq!(version.payload.system_prompt, "fragile");
}

#[test]
fn test_new_branch_forks_from_default_branch() {
    let s = stores();
    let created = create(&s, "root");
    let tid = created.template.id.clone();
    let v1 = created.version;

    let v2 = s
        .versions
        .create_version(&tid, NewVersion::new(payload("feature work"), "alice").on_branch("feature"))
        .unwrap();
    assert_eq!(v2.version_number, 2);
    assert_eq!(v2.parent_version_id.as_deref(), Some(v1.id.as_str()));
    assert!(s.versions.is_ancestor(&tid, &v1.id, &v2.id).unwrap());

    let chain = s.versions.history(&tid, &v2.id, None).unwrap();
    assert_eq!(chain.last().map(|v| v.id.as_str()), Some(v1.id.as_str()));
    assert_eq!(s.branches.get_branch(&tid, "main").unwrap().version_id, v1.id);
}

#[test]
fn test_delete_template_with_long_history() {
    let s = stores();
    let created = create(&s, "v1");
    let tid = created.template.id.clone();
    for i in 2..=1100 {
        s.versions
            .create_version(&tid, NewVersion::new(payload(&format!("v{i}")), "alice"))
            .unwrap();
    }
    assert_eq!(s.versions.count_versions(&tid).unwrap(), 1100);

    s.templates.delete_template(&tid).unwrap();

    assert!(s.templates.get_template(&tid).unwrap_err().is_not_found());
    assert!(s
        .versions
        .get_version_by_id(&created.version.id)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_commits_from_separate_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompts.db");

    let tid = {
        let s = stores_on(Arc::new(PromptDatabase::open(&path).unwrap()));
        create(&s, "seed").template.id
    };

    let first = Arc::new(PromptDatabase::open(&path).unwrap());
    let second = Arc::new(PromptDatabase::open(&path).unwrap());

    // Distinct content from two handles: every commit lands with its own number
    let handles: Vec<_> = [(first.clone(), "a"), (second.clone(), "b")]
        .into_iter()
        .map(|(db, prefix)| {
            let tid = tid.clone();
            std::thread::spawn(move || {
                let versions = VersionStore::new(db);
                (0..10)
                    .map(|i| {
                        versions
                            .create_version(
                                &tid,
                                NewVersion::new(payload(&format!("{prefix}{i}")), "worker"),
                            )
                            .map(|v| v.version_number)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers: Vec<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|r| r.unwrap())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (2..=21).collect::<Vec<_>>());

    // Identical content from two handles: exactly one wins
    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|db| {
            let tid = tid.clone();
            std::thread::spawn(move || {
                VersionStore::new(db).create_version(&tid, NewVersion::new(payload("same"), "worker"))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::Conflict);
    assert!(matches!(
        loser,
        StoreError::DuplicateContent { version_number: 22, .. }
    ));
}
