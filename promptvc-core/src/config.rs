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

//! Configuration for prompt version control
//!
//! Loaded with priority file > environment > defaults.

use crate::model::{ModelConfig, DEFAULT_BRANCH};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptVcConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub versioning: VersioningConfig,
    /// Model configurations served to the resolver when no external
    /// experiment-configuration service is wired in
    #[serde(default)]
    pub model_configs: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long a writer waits on a locked database before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VersioningConfig {
    /// Branch created with every new template
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Context lines around each diff hunk
    #[serde(default = "default_diff_context_lines")]
    pub diff_context_lines: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./promptvc-data/prompts.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_diff_context_lines() -> usize {
    3
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            diff_context_lines: default_diff_context_lines(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PromptVcConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - PROMPTVC_DATABASE_PATH: SQLite file (default: ./promptvc-data/prompts.db)
    /// - PROMPTVC_BUSY_TIMEOUT_MS: lock wait in milliseconds (default: 5000)
    /// - PROMPTVC_DEFAULT_BRANCH: initial branch of new templates (default: main)
    /// - PROMPTVC_DIFF_CONTEXT_LINES: context lines in patches (default: 3)
    pub fn from_env() -> Self {
        Self::merge_with_env(Self::default())
    }

    /// Load configuration with priority: file > env > defaults
    ///
    /// Env vars still override individual keys the file sets.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        Ok(Self::merge_with_env(config))
    }

    /// Env vars override only when explicitly set and parseable
    fn merge_with_env(mut config: Self) -> Self {
        if let Ok(path) = std::env::var("PROMPTVC_DATABASE_PATH") {
            config.storage.database_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("PROMPTVC_BUSY_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse() {
                config.storage.busy_timeout_ms = val;
            }
        }

        if let Ok(branch) = std::env::var("PROMPTVC_DEFAULT_BRANCH") {
            if !branch.trim().is_empty() {
                config.versioning.default_branch = branch;
            }
        }

        if let Ok(lines) = std::env::var("PROMPTVC_DIFF_CONTEXT_LINES") {
            if let Ok(val) = lines.parse() {
                config.versioning.diff_context_lines = val;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PromptVcConfig::default();
        assert_eq!(config.versioning.default_branch, "main");
        assert_eq!(config.versioning.diff_context_lines, 3);
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert!(config.model_configs.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[versioning]
diff_context_lines = 1

[[model_configs]]
id = "mc-1"
study_id = "study-1"
name = "small"
provider = "ollama"
model = "llama3.2:3b"

[model_configs.parameters]
temperature = 0.7
"#
        )
        .unwrap();

        let config = PromptVcConfig::from_file(file.path()).unwrap();
        assert_eq!(config.versioning.diff_context_lines, 1);
        assert_eq!(config.versioning.default_branch, "main");
        assert_eq!(config.model_configs.len(), 1);
        assert_eq!(config.model_configs[0].parameters.temperature, Some(0.7));
        assert_eq!(config.model_configs[0].parameters.max_tokens, None);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config =
            PromptVcConfig::load(Some(PathBuf::from("/nonexistent/promptvc.toml"))).unwrap();
        assert_eq!(config.versioning.max_page_size, 500);
    }
}
