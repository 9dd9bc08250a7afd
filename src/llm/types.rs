//! Shared types for LLM providers

use serde::{Deserialize, Serialize};

/// Role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message in OpenAI wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion returned by a backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub content: Option<String>,
    /// Provider-specific reasoning trace, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_details: Option<serde_json::Value>,
}

impl QueryResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            reasoning_details: None,
        }
    }

    /// Content with surrounding whitespace removed, `None` when blank
    pub fn non_empty_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Outcome of one query against one backend.
///
/// A reachable backend that produced an empty completion is `Ok` with an
/// empty or absent `content`; anything that prevented a completion
/// (unknown provider, missing credentials, transport or decode failure,
/// timeout) is `Failed` with a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Ok(QueryResult),
    Failed { reason: String },
}

impl QueryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        QueryOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueryOutcome::Ok(_))
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            QueryOutcome::Ok(result) => Some(result),
            QueryOutcome::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            QueryOutcome::Ok(_) => None,
            QueryOutcome::Failed { reason } => Some(reason),
        }
    }

    /// Coalesced view: the result, or `None` for any failure
    pub fn into_result(self) -> Option<QueryResult> {
        match self {
            QueryOutcome::Ok(result) => Some(result),
            QueryOutcome::Failed { .. } => None,
        }
    }
}
