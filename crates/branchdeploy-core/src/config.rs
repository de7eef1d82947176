//! Environment-style configuration.
//!
//! Every value is read through a lookup function rather than `std::env`
//! directly, so phases receive explicit settings and tests can supply a
//! plain map.

use crate::error::{DeployError, Result};
use crate::poll::PollPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DB_NAME: &str = "DB_NAME";
pub const SERVICE_TOKEN_ID: &str = "PLANETSCALE_SERVICE_TOKEN_ID";
pub const SERVICE_TOKEN: &str = "PLANETSCALE_SERVICE_TOKEN";
pub const ORG: &str = "PLANETSCALE_ORG";
pub const BRANCH_PREFIX: &str = "PLANETSCALE_BRANCH_PREFIX";
pub const HEAD_REF: &str = "GITHUB_HEAD_REF";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const GITHUB_EVENT_PATH: &str = "GITHUB_EVENT_PATH";
pub const GITHUB_WORKSPACE: &str = "GITHUB_WORKSPACE";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const GITHUB_SERVER_URL: &str = "GITHUB_SERVER_URL";
pub const GITHUB_OUTPUT: &str = "GITHUB_OUTPUT";
pub const PUSH_COMMAND: &str = "PRISMA_DB_PUSH_COMMAND";
pub const BOT_LOGIN: &str = "BRANCHDEPLOY_BOT_LOGIN";
pub const HANDOFF_DIR: &str = "BRANCHDEPLOY_HANDOFF_DIR";
pub const PSCALE_BIN: &str = "PSCALE_BIN";
pub const POLL_INTERVAL_MS: &str = "BRANCHDEPLOY_POLL_INTERVAL_MS";
pub const POLL_MAX_ATTEMPTS: &str = "BRANCHDEPLOY_POLL_MAX_ATTEMPTS";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_SERVER_URL: &str = "https://github.com";
pub const DEFAULT_BOT_LOGIN: &str = "github-actions[bot]";
pub const DEFAULT_HANDOFF_DIR: &str = "/tmp";

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(lookup, key).ok_or_else(|| DeployError::missing(key))
}

fn optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match optional(lookup, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DeployError::Configuration {
                key: key.to_string(),
                reason: format!("must be a number, got '{raw}'"),
            }),
    }
}

/// Read a value from the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ---------------------------------------------------------------------------
// RemoteAuth
// ---------------------------------------------------------------------------

/// Identity and credentials for every remote command.
#[derive(Clone)]
pub struct RemoteAuth {
    pub database: String,
    pub service_token_id: String,
    pub service_token: String,
    pub org: String,
}

impl RemoteAuth {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database: required(lookup, DB_NAME)?,
            service_token: required(lookup, SERVICE_TOKEN)?,
            service_token_id: required(lookup, SERVICE_TOKEN_ID)?,
            org: required(lookup, ORG)?,
        })
    }
}

impl std::fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAuth")
            .field("database", &self.database)
            .field("service_token_id", &self.service_token_id)
            .field("service_token", &crate::redact::REDACTED)
            .field("org", &self.org)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GithubSettings
// ---------------------------------------------------------------------------

/// Settings for the comment API.
#[derive(Clone)]
pub struct GithubSettings {
    pub token: String,
    /// `owner/repo`
    pub repository: String,
    pub api_url: String,
    pub server_url: String,
    pub bot_login: String,
    pub event_path: Option<PathBuf>,
}

impl GithubSettings {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let token = required(lookup, GITHUB_TOKEN)?;
        let repository = required(lookup, GITHUB_REPOSITORY)?;
        if !repository.contains('/') {
            return Err(DeployError::Configuration {
                key: GITHUB_REPOSITORY.to_string(),
                reason: format!("must be owner/repo, got '{repository}'"),
            });
        }
        Ok(Self {
            token,
            repository,
            api_url: optional(lookup, GITHUB_API_URL).unwrap_or_else(|| DEFAULT_API_URL.into()),
            server_url: optional(lookup, GITHUB_SERVER_URL)
                .unwrap_or_else(|| DEFAULT_SERVER_URL.into()),
            bot_login: optional(lookup, BOT_LOGIN).unwrap_or_else(|| DEFAULT_BOT_LOGIN.into()),
            event_path: optional(lookup, GITHUB_EVENT_PATH).map(PathBuf::from),
        })
    }

    /// Web URL of a pull request, used in provenance annotations.
    pub fn pull_request_url(&self, number: u64) -> String {
        format!(
            "{}/{}/pull/{number}",
            self.server_url.trim_end_matches('/'),
            self.repository
        )
    }
}

impl std::fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSettings")
            .field("repository", &self.repository)
            .field("api_url", &self.api_url)
            .field("bot_login", &self.bot_login)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Everything else a phase needs: naming, hand-off, polling, push variant.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub branch_prefix: String,
    pub head_ref: Option<String>,
    pub workspace: Option<PathBuf>,
    pub push_command: Option<String>,
    pub handoff_dir: PathBuf,
    pub output_file: Option<PathBuf>,
    pub pscale_bin: Option<PathBuf>,
    pub poll: PollPolicy,
}

impl PipelineSettings {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut poll = PollPolicy::default();
        if let Some(ms) = parse_number::<u64>(lookup, POLL_INTERVAL_MS)? {
            poll.interval = Duration::from_millis(ms);
        }
        poll.max_attempts = parse_number::<u32>(lookup, POLL_MAX_ATTEMPTS)?;

        Ok(Self {
            branch_prefix: lookup(BRANCH_PREFIX).unwrap_or_default(),
            head_ref: optional(lookup, HEAD_REF),
            workspace: optional(lookup, GITHUB_WORKSPACE).map(PathBuf::from),
            push_command: optional(lookup, PUSH_COMMAND),
            handoff_dir: optional(lookup, HANDOFF_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HANDOFF_DIR)),
            output_file: optional(lookup, GITHUB_OUTPUT).map(PathBuf::from),
            pscale_bin: optional(lookup, PSCALE_BIN).map(PathBuf::from),
            poll,
        })
    }

    /// The source branch, required by phases that derive the database branch name.
    pub fn require_head_ref(&self) -> Result<&str> {
        self.head_ref
            .as_deref()
            .ok_or_else(|| DeployError::missing(HEAD_REF))
    }
}
