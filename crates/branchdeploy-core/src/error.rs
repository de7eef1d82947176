use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{key} {reason}")]
    Configuration { key: String, reason: String },

    /// Already redacted: the service token never survives into this text.
    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    #[error("unexpected output from '{command}': {message}")]
    Parse { command: String, message: String },

    #[error(
        "the deploy request for {branch} is not approved. \
         Please approve it in PlanetScale and run this action again"
    )]
    Approval { branch: String },

    #[error("connection string for credential '{0}' has no url line")]
    MissingConnectionUrl(String),

    #[error("gave up waiting for {what} after {attempts} checks")]
    PollExhausted { what: String, attempts: u32 },

    #[error("comment API request failed (status {status:?}): {message}")]
    CommentApi { status: Option<u16>, message: String },

    #[error("schema push command failed: {0}")]
    PushFailed(String),

    #[error("invalid pull request event: {0}")]
    Event(String),

    #[error("no {0} recorded by an earlier phase")]
    MissingHandoff(&'static str),

    #[error("pscale binary not found: {0}")]
    CliNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    pub fn missing(key: &str) -> Self {
        DeployError::Configuration {
            key: key.to_string(),
            reason: "environment variable is not set".to_string(),
        }
    }

    /// Errors the remote client has already surfaced through its failure hook.
    pub fn is_remote(&self) -> bool {
        matches!(self, DeployError::RemoteCommand(_))
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
