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

//! Content hashing
//!
//! A version's identity for deduplication is the SHA-256 of a canonical
//! serialization of its payload. The canonical form is a fixed-order
//! structure, not a key-sorted one: the six semantic fields are always
//! emitted in the same order and a missing output schema is written as an
//! explicit `null`.

use crate::payload::{FewShotExample, PromptPayload, TemplateVariable, ToolDefinition};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a canonical payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap a stored hash. No validation; the store only holds hashes it computed.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (12 hex chars) for logs and CLI output
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }

    /// Match against a (possibly abbreviated) hex prefix
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field order here is the hashing contract. Do not reorder.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalPayload<'a> {
    system_prompt: &'a str,
    user_prompt_template: &'a str,
    template_variables: &'a [TemplateVariable],
    few_shot_examples: &'a [FewShotExample],
    output_schema: Option<&'a serde_json::Value>,
    tool_definitions: &'a [ToolDefinition],
}

/// Computes content fingerprints for prompt payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Canonical bytes that get hashed
    pub fn canonical_bytes(payload: &PromptPayload) -> Vec<u8> {
        let canonical = CanonicalPayload {
            system_prompt: &payload.system_prompt,
            user_prompt_template: &payload.user_prompt_template,
            template_variables: &payload.template_variables,
            few_shot_examples: &payload.few_shot_examples,
            output_schema: payload.output_schema.as_ref(),
            tool_definitions: &payload.tool_definitions,
        };
        // Serializing borrowed strings, vectors of plain structs and Values cannot fail
        serde_json::to_vec(&canonical).unwrap_or_default()
    }

    pub fn hash(payload: &PromptPayload) -> ContentHash {
        let digest = Sha256::digest(Self::canonical_bytes(payload));
        ContentHash(hex::encode(digest))
    }
}
