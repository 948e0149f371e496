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

//! Store errors
//!
//! One taxonomy for every prompt version-control operation. All variants
//! are recoverable; callers (typically an HTTP layer) branch on [`ErrorKind`].

use promptvc_core::{BranchNameError, PayloadError};
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Template,
    Version,
    Branch,
    Variant,
    ModelConfig,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Template => "Template",
            Entity::Version => "Version",
            Entity::Branch => "Branch",
            Entity::Variant => "Variant",
            Entity::ModelConfig => "Model config",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: Entity, id: String },

    #[error("Identical content already exists as version {version_number} ({version_id})")]
    DuplicateContent {
        version_id: String,
        version_number: u32,
    },

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification for status-code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    InvalidInput,
    Internal,
}

impl StoreError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn already_exists(entity: Entity, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StoreError::DuplicateContent { .. } | StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Database(err) if is_busy(err) => ErrorKind::Conflict,
            StoreError::Database(_) | StoreError::Serialization(_) | StoreError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether retrying the same call may succeed. Duplicate content never
    /// will; a lost race for a version number or a busy database can.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict(_) => true,
            StoreError::Database(err) => is_busy(err),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<BranchNameError> for StoreError {
    fn from(err: BranchNameError) -> Self {
        StoreError::InvalidInput(err.to_string())
    }
}

impl From<PayloadError> for StoreError {
    fn from(err: PayloadError) -> Self {
        StoreError::InvalidInput(err.to_string())
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Message of a UNIQUE / PRIMARY KEY violation, e.g.
/// `UNIQUE constraint failed: prompt_versions.template_id, prompt_versions.content_hash`
pub(crate) fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation
                && msg.starts_with("UNIQUE constraint failed") =>
        {
            Some(msg.as_str())
        }
        _ => None,
    }
}

pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("FOREIGN KEY")
    )
}
