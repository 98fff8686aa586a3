//! Webhook payload structures

use serde::Deserialize;
use std::fmt;

/// The subset of a GitHub push event the deployer cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub after: Option<String>,
    /// `null` when the push deletes the ref.
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    #[serde(default)]
    pub pusher: Option<Pusher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: String,
}

impl PushEvent {
    /// Parse a push payload, rejecting anything without a string `ref`.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Commit details for logs and notifications.
    pub fn commit_summary(&self) -> CommitSummary {
        match &self.head_commit {
            Some(commit) => CommitSummary {
                id: commit.id.clone(),
                message: commit.message.clone(),
                author_name: commit.author.name.clone(),
                author_email: commit.author.email.clone(),
            },
            None => CommitSummary {
                id: self.after.clone().unwrap_or_else(|| NONE.to_string()),
                message: NONE.to_string(),
                author_name: self
                    .pusher
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| NONE.to_string()),
                author_email: NONE.to_string(),
            },
        }
    }
}

const NONE: &str = "(none)";

/// Squashed commits can carry very long messages.
const MAX_COMMIT_MSG_LEN: usize = 500;
const TRUNCATED_MARKER: &str = "... (truncated)";

/// Cuts `text` to at most `max` characters, ending in a truncation marker.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATED_MARKER.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATED_MARKER);
    truncated
}

/// Flattened head-commit details carried through a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
}

impl CommitSummary {
    /// Notification body shared by the start and success messages.
    pub fn deployment_info(&self) -> String {
        format!(
            "Trigger: GitHub Webhook\nCommit: {}\nMessage: {}\nAuthor: {} <{}>",
            self.id,
            truncate_chars(&self.message, MAX_COMMIT_MSG_LEN),
            self.author_name,
            self.author_email
        )
    }
}

impl fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.message)
    }
}
