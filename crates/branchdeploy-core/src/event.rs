use crate::error::{DeployError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// The subset of a `pull_request` webhook payload the lifecycle reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
}

/// What the merge phase should do for this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeIntent {
    Merge,
    Close,
    Skip,
}

impl PullRequestEvent {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| DeployError::Event(e.to_string()))
    }

    pub fn pull_request_number(&self) -> Result<u64> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.number)
            .or(self.number)
            .ok_or_else(|| DeployError::Event("payload has no pull request number".to_string()))
    }

    pub fn merged(&self) -> bool {
        self.pull_request.as_ref().is_some_and(|pr| pr.merged)
    }

    pub fn merge_intent(&self) -> MergeIntent {
        if self.merged() {
            MergeIntent::Merge
        } else if self.action.as_deref() == Some("closed") {
            MergeIntent::Close
        } else {
            MergeIntent::Skip
        }
    }
}
