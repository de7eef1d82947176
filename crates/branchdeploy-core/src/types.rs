use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DatabaseBranch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseBranch {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// DeployRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployRequestState {
    Open,
    Closed,
}

impl DeployRequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployRequestState::Open => "open",
            DeployRequestState::Closed => "closed",
        }
    }
}

impl fmt::Display for DeployRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub deployable: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// The only completion signal: non-null once the deploy has landed.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub id: String,
    pub number: u64,
    pub branch: String,
    pub state: DeployRequestState,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deployment: Option<DeploymentStatus>,
}

impl DeployRequest {
    pub fn is_open(&self) -> bool {
        self.state == DeployRequestState::Open
    }

    pub fn deployment_finished(&self) -> bool {
        self.deployment
            .as_ref()
            .is_some_and(|d| d.finished_at.is_some())
    }
}

/// One schema diff entry, as returned by `deploy-request diff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub name: String,
    #[serde(default)]
    pub raw: String,
    #[serde(default)]
    pub html: String,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionStrings {
    #[serde(default)]
    pub prisma: Option<String>,
    #[serde(default)]
    pub general: Option<String>,
}

/// Response of `password create`; only the fields the lifecycle reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub connection_strings: Option<ConnectionStrings>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub connection_url: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("connection_url", &"***")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentUser {
    pub login: String,
}

/// An issue comment as returned by the comment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<CommentUser>,
}
