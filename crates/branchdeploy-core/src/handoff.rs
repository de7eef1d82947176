//! State that crosses the process boundary between pipeline phases.
//!
//! The branch name and credential name are written to two well-known files
//! in the hand-off directory. Pipeline outputs are appended to the
//! `GITHUB_OUTPUT` file as `key=value` lines.
//!
//! Two pull requests that normalize to the same branch name share these
//! files; concurrent runs for the same name are not guarded.

use crate::error::{DeployError, Result};
use crate::io;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BRANCH_FILE: &str = "planetscale-branch-name";
pub const CREDENTIAL_FILE: &str = "planetscale-password-name";

pub const OUT_BRANCH: &str = "database-branch-name";
pub const OUT_URL: &str = "temporary-database-url";
pub const OUT_CREDENTIAL: &str = "temporary-password-name";
pub const OUT_DR_NUMBER: &str = "deploy-request-number";
pub const OUT_DR_STATE: &str = "deploy-request-state";
pub const OUT_DR_APPROVED: &str = "deploy-request-approved";

#[derive(Debug, Clone)]
pub struct Handoff {
    dir: PathBuf,
}

impl Handoff {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn branch_path(&self) -> PathBuf {
        self.dir.join(BRANCH_FILE)
    }

    pub fn credential_path(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE)
    }

    pub fn write_branch_name(&self, name: &str) -> Result<()> {
        io::atomic_write(&self.branch_path(), name.as_bytes())
    }

    pub fn write_credential_name(&self, name: &str) -> Result<()> {
        io::atomic_write(&self.credential_path(), name.as_bytes())
    }

    pub fn read_branch_name(&self) -> Result<String> {
        io::read_trimmed(&self.branch_path())?
            .filter(|s| !s.is_empty())
            .ok_or(DeployError::MissingHandoff("database branch name"))
    }

    pub fn read_credential_name(&self) -> Result<Option<String>> {
        Ok(io::read_trimmed(&self.credential_path())?.filter(|s| !s.is_empty()))
    }
}

/// Named pipeline outputs for downstream steps.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    file: Option<PathBuf>,
}

impl OutputSink {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Record `key=value` in `outputs` and append it to the output file, if any.
    pub fn publish(
        &self,
        outputs: &mut BTreeMap<String, String>,
        key: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        let value = value.into();
        if let Some(file) = &self.file {
            io::append_text(file, &format!("{key}={value}\n"))?;
        }
        outputs.insert(key.to_string(), value);
        Ok(())
    }
}
