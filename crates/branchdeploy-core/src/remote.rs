//! Remote client for the branch-database CLI.
//!
//! Every remote operation is a `pscale` invocation of the form
//!
//! ```text
//! pscale <category> <action> <database> [args...] \
//!     --service-token-id <id> --service-token <secret> --org <org> --format json
//! ```
//!
//! Output is always requested as JSON. A failed invocation is redacted,
//! passed to the optional failure hook, and returned as
//! [`DeployError::RemoteCommand`]; malformed output is a separate
//! [`DeployError::Parse`].

use crate::config::RemoteAuth;
use crate::error::{DeployError, Result};
use crate::redact::redact;
use crate::types::{DatabaseBranch, DeployRequest, Diff, PasswordResult};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Branch,
    DeployRequest,
    Password,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Branch => "branch",
            Category::DeployRequest => "deploy-request",
            Category::Password => "password",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// Executes one CLI invocation. `Ok` carries stdout; `Err` carries a
/// human-readable failure including the command line and stderr.
pub trait CommandRunner {
    fn run(&self, args: &[String]) -> std::result::Result<String, String>;
}

/// Runs the real `pscale` binary.
#[derive(Debug, Clone)]
pub struct PscaleCli {
    bin: PathBuf,
}

impl PscaleCli {
    /// Use `explicit` if given, otherwise locate `pscale` on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(bin) = explicit {
            return Ok(Self {
                bin: bin.to_path_buf(),
            });
        }
        let bin = which::which("pscale").map_err(|e| DeployError::CliNotFound(e.to_string()))?;
        Ok(Self { bin })
    }
}

impl CommandRunner for PscaleCli {
    fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        let command_line = format!("{} {}", self.bin.display(), args.join(" "));
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("Command failed: {command_line}\n{e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("Command failed: {command_line}\n{}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ---------------------------------------------------------------------------
// RemoteClient
// ---------------------------------------------------------------------------

pub type FailureHook = Box<dyn Fn(&str)>;

pub struct RemoteClient {
    auth: RemoteAuth,
    runner: Box<dyn CommandRunner>,
    on_failure: Option<FailureHook>,
}

impl RemoteClient {
    pub fn new(auth: RemoteAuth, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            auth,
            runner,
            on_failure: None,
        }
    }

    /// Called with the redacted error text whenever an invocation fails.
    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn auth(&self) -> &RemoteAuth {
        &self.auth
    }

    fn build_args(&self, category: Category, action: &str, args: &[&str]) -> Vec<String> {
        let mut argv = vec![
            category.as_str().to_string(),
            action.to_string(),
            self.auth.database.clone(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv.extend([
            "--service-token-id".to_string(),
            self.auth.service_token_id.clone(),
            "--service-token".to_string(),
            self.auth.service_token.clone(),
            "--org".to_string(),
            self.auth.org.clone(),
            "--format".to_string(),
            "json".to_string(),
        ]);
        argv
    }

    /// Run one remote operation and return its raw (JSON) stdout.
    pub fn invoke(&self, category: Category, action: &str, args: &[&str]) -> Result<String> {
        let argv = self.build_args(category, action, args);
        tracing::debug!(
            command = %redact(&argv.join(" "), &self.auth.service_token),
            "invoking remote command"
        );
        self.runner.run(&argv).map_err(|raw| {
            let message = redact(&raw, &self.auth.service_token);
            if let Some(hook) = &self.on_failure {
                hook(&message);
            }
            DeployError::RemoteCommand(message)
        })
    }

    /// Run one remote operation and deserialize its output.
    pub fn invoke_json<T: DeserializeOwned>(
        &self,
        category: Category,
        action: &str,
        args: &[&str],
    ) -> Result<T> {
        let stdout = self.invoke(category, action, args)?;
        serde_json::from_str(&stdout).map_err(|e| DeployError::Parse {
            command: format!("{category} {action}"),
            message: e.to_string(),
        })
    }

    // -- branches -----------------------------------------------------------

    pub fn list_branches(&self) -> Result<Vec<DatabaseBranch>> {
        self.invoke_json(Category::Branch, "list", &[])
    }

    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.invoke(Category::Branch, "create", &[name]).map(drop)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.invoke(Category::Branch, "delete", &[name, "--force"])
            .map(drop)
    }

    // -- deploy requests ----------------------------------------------------

    pub fn list_deploy_requests(&self) -> Result<Vec<DeployRequest>> {
        self.invoke_json(Category::DeployRequest, "list", &[])
    }

    pub fn create_deploy_request(&self, branch: &str) -> Result<DeployRequest> {
        self.invoke_json(Category::DeployRequest, "create", &[branch])
    }

    pub fn review_deploy_request(&self, number: u64, comment: &str) -> Result<()> {
        let number = number.to_string();
        self.invoke(
            Category::DeployRequest,
            "review",
            &[&number, "--comment", comment],
        )
        .map(drop)
    }

    pub fn diff_deploy_request(&self, number: u64) -> Result<Vec<Diff>> {
        let number = number.to_string();
        self.invoke_json(Category::DeployRequest, "diff", &[&number])
    }

    pub fn deploy_deploy_request(&self, number: u64) -> Result<()> {
        let number = number.to_string();
        self.invoke(Category::DeployRequest, "deploy", &[&number])
            .map(drop)
    }

    pub fn close_deploy_request(&self, number: u64) -> Result<()> {
        let number = number.to_string();
        self.invoke(Category::DeployRequest, "close", &[&number])
            .map(drop)
    }

    // -- passwords ----------------------------------------------------------

    pub fn create_password(&self, branch: &str, name: &str) -> Result<PasswordResult> {
        self.invoke_json(Category::Password, "create", &[branch, name])
    }

    pub fn delete_password(&self, branch: &str, name: &str) -> Result<()> {
        self.invoke(Category::Password, "delete", &[branch, name, "--force"])
            .map(drop)
    }
}
