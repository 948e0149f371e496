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

//! Promptvc CLI
//!
//! Command-line interface for branch-based prompt version control.
//! Every command prints JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use promptvc_core::{
    FewShotExample, Page, PromptPayload, PromptVcConfig, TemplateUpdate, VariantOverrides,
    VariantUpdate,
};
use promptvc_prompts::{ConditionRef, PromptRegistry};
use promptvc_storage::{NewVersion, VariantFilter, VersionRef};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptvc")]
#[command(about = "Promptvc - branch-based prompt version control", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PROMPTVC_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Commit new content to a template
    Commit {
        template_id: String,

        /// Payload JSON file
        #[arg(long)]
        payload: PathBuf,

        /// Target branch (defaults to the template's default branch)
        #[arg(long)]
        branch: Option<String>,

        /// Parent version ID (defaults to the branch tip)
        #[arg(long)]
        parent: Option<String>,

        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        author: Author,
    },

    /// List versions, newest first
    Log {
        template_id: String,

        #[arg(long, default_value = "0")]
        offset: u32,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show one version by number or ID
    Show { template_id: String, version: String },

    /// Walk a version's ancestry back to the root
    History {
        template_id: String,
        version_id: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage branches
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// Diff two versions by number
    Diff {
        template_id: String,
        from: u32,
        to: u32,

        /// Print unified patches instead of JSON
        #[arg(long)]
        patch: bool,
    },

    /// Manage model-config variants
    Variant {
        #[command(subcommand)]
        command: VariantCommands,
    },

    /// Resolve a condition into an executable prompt
    Resolve {
        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        variant: Option<String>,

        #[arg(long)]
        model_config: Option<String>,

        /// Render the user prompt with KEY=VALUE pairs
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Create a template with its first version
    Create {
        #[arg(long)]
        study: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Initial payload JSON file
        #[arg(long)]
        payload: PathBuf,

        #[arg(short, long)]
        message: Option<String>,

        #[command(flatten)]
        author: Author,
    },

    /// List templates of a study
    List {
        #[arg(long)]
        study: String,
    },

    Show { template_id: String },

    Update {
        template_id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long)]
        default_branch: Option<String>,
    },

    /// Delete a template and all of its history
    Delete {
        template_id: String,

        /// Confirm the irreversible delete
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// Create a branch (defaults to the default branch's version)
    Create {
        template_id: String,
        name: String,

        #[arg(long)]
        version: Option<String>,
    },

    /// Point a branch at another version
    Move {
        template_id: String,
        name: String,
        version_id: String,
    },

    Delete { template_id: String, name: String },

    List { template_id: String },
}

#[derive(Subcommand)]
enum VariantCommands {
    Create {
        template_id: String,

        #[arg(long)]
        version: String,

        #[arg(long)]
        model_config: String,

        /// Overrides JSON file
        #[arg(long)]
        overrides: Option<PathBuf>,

        #[arg(long)]
        notes: Option<String>,
    },

    Update {
        template_id: String,
        variant_id: String,

        #[command(flatten)]
        changes: VariantChanges,
    },

    Delete {
        template_id: String,
        variant_id: String,
    },

    List {
        template_id: String,

        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        model_config: Option<String>,
    },

    Show {
        template_id: String,
        variant_id: String,
    },
}

#[derive(Args)]
struct Author {
    /// Recorded as the creator
    #[arg(long, env = "PROMPTVC_AUTHOR", default_value = "cli")]
    author: String,
}

#[derive(Args)]
struct VariantChanges {
    #[arg(long, conflicts_with = "clear_system_prompt")]
    system_prompt: Option<String>,

    #[arg(long)]
    clear_system_prompt: bool,

    #[arg(long, conflicts_with = "clear_user_template")]
    user_template: Option<String>,

    #[arg(long)]
    clear_user_template: bool,

    /// Few-shot examples JSON file
    #[arg(long, conflicts_with = "clear_examples")]
    examples: Option<PathBuf>,

    #[arg(long)]
    clear_examples: bool,

    #[arg(long, conflicts_with = "clear_notes")]
    notes: Option<String>,

    #[arg(long)]
    clear_notes: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for JSON
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = PromptVcConfig::load(cli.config.clone())?;
    if let Some(path) = &cli.db_path {
        config.storage.database_path = path.clone();
    }
    debug!("Using database {:?}", config.storage.database_path);

    let registry = PromptRegistry::open(&config).with_context(|| {
        format!(
            "Failed to open prompt database at {:?}",
            config.storage.database_path
        )
    })?;

    match cli.command {
        Commands::Template { command } => handle_template_command(&registry, command),
        Commands::Commit {
            template_id,
            payload,
            branch,
            parent,
            message,
            author,
        } => {
            let mut new = NewVersion::new(read_json::<PromptPayload>(&payload)?, author.author);
            new.branch = branch;
            new.parent_version_id = parent;
            new.message = message;
            let version = registry
                .versions()
                .create_version(&template_id, new)
                .context("Failed to commit version")?;
            print_json(&version)
        }
        Commands::Log {
            template_id,
            offset,
            limit,
        } => {
            let limit = limit.unwrap_or(config.versioning.default_page_size);
            let versions = registry
                .versions()
                .list_versions(&template_id, Page::new(offset, limit))?;
            print_json(&versions)
        }
        Commands::Show {
            template_id,
            version,
        } => print_json(
            &registry
                .versions()
                .get_version(&template_id, parse_version_ref(&version))?,
        ),
        Commands::History {
            template_id,
            version_id,
            limit,
        } => print_json(
            &registry
                .versions()
                .history(&template_id, &version_id, limit)?,
        ),
        Commands::Branch { command } => handle_branch_command(&registry, command),
        Commands::Diff {
            template_id,
            from,
            to,
            patch,
        } => {
            let changes = registry.diff().diff(&template_id, from, to)?;
            if !patch {
                return print_json(&changes);
            }
            for (field, change) in [
                ("system_prompt", &changes.system_prompt),
                ("user_prompt_template", &changes.user_prompt_template),
            ] {
                if let Some(change) = change {
                    println!("# {}", field);
                    print!("{}", change.patch);
                }
            }
            Ok(())
        }
        Commands::Variant { command } => handle_variant_command(&registry, command),
        Commands::Resolve {
            version,
            variant,
            model_config,
            vars,
        } => {
            let condition = ConditionRef {
                version_id: version,
                variant_id: variant,
                model_config_id: model_config,
            };
            let effective = registry.resolver().resolve(&condition)?;
            if vars.is_empty() {
                return print_json(&effective);
            }
            let values: HashMap<String, String> = vars.into_iter().collect();
            let rendered = effective
                .render(&values)
                .context("Failed to render user prompt")?;
            print_json(&serde_json::json!({
                "prompt": effective,
                "rendered_user_prompt": rendered,
            }))
        }
    }
}

fn handle_template_command(registry: &PromptRegistry, command: TemplateCommands) -> Result<()> {
    match command {
        TemplateCommands::Create {
            study,
            name,
            description,
            payload,
            message,
            author,
        } => {
            let created = registry
                .manager()
                .create_template(
                    &study,
                    &name,
                    description,
                    read_json(&payload)?,
                    message,
                    &author.author,
                )
                .context("Failed to create template")?;
            print_json(&created)
        }
        TemplateCommands::List { study } => {
            print_json(&registry.manager().list_templates(&study)?)
        }
        TemplateCommands::Show { template_id } => {
            let template = registry.manager().get_template(&template_id)?;
            let branches = registry.branches().list_branches(&template_id)?;
            let versions = registry.versions().count_versions(&template_id)?;
            print_json(&serde_json::json!({
                "template": template,
                "branches": branches,
                "version_count": versions,
            }))
        }
        TemplateCommands::Update {
            template_id,
            name,
            description,
            clear_description,
            default_branch,
        } => {
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            let template = registry.manager().update_template(
                &template_id,
                TemplateUpdate {
                    name,
                    description,
                    default_branch_name: default_branch,
                },
            )?;
            print_json(&template)
        }
        TemplateCommands::Delete { template_id, yes } => {
            if !yes {
                bail!("Refusing to delete template {} without --yes", template_id);
            }
            registry.manager().delete_template(&template_id)?;
            info!("Deleted template {}", template_id);
            print_json(&serde_json::json!({ "deleted": template_id }))
        }
    }
}

fn handle_branch_command(registry: &PromptRegistry, command: BranchCommands) -> Result<()> {
    let branches = registry.branches();
    match command {
        BranchCommands::Create {
            template_id,
            name,
            version,
        } => print_json(&branches.create_branch(&template_id, &name, version.as_deref())?),
        BranchCommands::Move {
            template_id,
            name,
            version_id,
        } => print_json(&branches.move_branch(&template_id, &name, &version_id)?),
        BranchCommands::Delete { template_id, name } => {
            branches.delete_branch(&template_id, &name)?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
        BranchCommands::List { template_id } => print_json(&branches.list_branches(&template_id)?),
    }
}

fn handle_variant_command(registry: &PromptRegistry, command: VariantCommands) -> Result<()> {
    let variants = registry.variants();
    match command {
        VariantCommands::Create {
            template_id,
            version,
            model_config,
            overrides,
            notes,
        } => {
            let overrides = match overrides {
                Some(path) => read_json::<VariantOverrides>(&path)?,
                None => VariantOverrides::default(),
            };
            let variant = variants
                .create_variant(&template_id, &version, &model_config, overrides, notes)
                .context("Failed to create variant")?;
            print_json(&variant)
        }
        VariantCommands::Update {
            template_id,
            variant_id,
            changes,
        } => {
            let update = variant_update(changes)?;
            print_json(&variants.update_variant(&template_id, &variant_id, update)?)
        }
        VariantCommands::Delete {
            template_id,
            variant_id,
        } => {
            variants.delete_variant(&template_id, &variant_id)?;
            print_json(&serde_json::json!({ "deleted": variant_id }))
        }
        VariantCommands::List {
            template_id,
            version,
            model_config,
        } => {
            let filter = VariantFilter {
                version_id: version,
                model_config_id: model_config,
            };
            print_json(&variants.list_variants(&template_id, &filter)?)
        }
        VariantCommands::Show {
            template_id,
            variant_id,
        } => print_json(&variants.get_variant(&template_id, &variant_id)?),
    }
}

fn variant_update(changes: VariantChanges) -> Result<VariantUpdate> {
    let examples = match (changes.examples, changes.clear_examples) {
        (_, true) => Some(None),
        (Some(path), false) => Some(Some(read_json::<Vec<FewShotExample>>(&path)?)),
        (None, false) => None,
    };
    Ok(VariantUpdate {
        system_prompt_override: set_or_clear(changes.system_prompt, changes.clear_system_prompt),
        user_prompt_template_override: set_or_clear(
            changes.user_template,
            changes.clear_user_template,
        ),
        few_shot_examples_override: examples,
        notes: set_or_clear(changes.notes, changes.clear_notes),
    })
}

fn set_or_clear<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Numbers address versions by number, anything else by ID
fn parse_version_ref(raw: &str) -> VersionRef {
    match raw.trim_start_matches('#').parse::<u32>() {
        Ok(n) => VersionRef::Number(n),
        Err(_) => VersionRef::Id(raw.to_string()),
    }
}

fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
