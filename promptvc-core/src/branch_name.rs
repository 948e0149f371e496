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

//! Branch name rules (a subset of Git's ref-name rules)

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid branch name {name:?}: {reason}")]
pub struct BranchNameError {
    pub name: String,
    pub reason: String,
}

impl BranchNameError {
    fn new(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validate a branch name
pub fn validate_branch_name(name: &str) -> Result<(), BranchNameError> {
    if name.is_empty() {
        return Err(BranchNameError::new(name, "empty name"));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(BranchNameError::new(name, "cannot start or end with '.'"));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(BranchNameError::new(name, "cannot start or end with '/'"));
    }

    if name.contains("..") {
        return Err(BranchNameError::new(name, "cannot contain '..'"));
    }

    if name.contains("//") {
        return Err(BranchNameError::new(name, "cannot contain '//'"));
    }

    let invalid_chars = ['~', '^', ':', '\\', '?', '*', '['];
    for c in invalid_chars {
        if name.contains(c) {
            return Err(BranchNameError::new(name, format!("cannot contain '{}'", c)));
        }
    }

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BranchNameError::new(
            name,
            "cannot contain whitespace or control characters",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_validation() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("experimental").is_ok());
        assert!(validate_branch_name("feature/gemma-27b").is_ok());
        assert!(validate_branch_name("v1.0.0").is_ok());

        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name(".hidden").is_err());
        assert!(validate_branch_name("bad..name").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("tab\tname").is_err());
        assert!(validate_branch_name("a//b").is_err());
        assert!(validate_branch_name("trailing/").is_err());
        assert!(validate_branch_name("what?").is_err());
    }

    #[test]
    fn test_error_message() {
        let err = validate_branch_name("x:y").unwrap_err();
        assert_eq!(err.to_string(), "invalid branch name \"x:y\": cannot contain ':'");
    }
}
