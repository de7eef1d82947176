use crate::error::Result;
use crate::poll::Poller;
use crate::remote::RemoteClient;
use crate::types::DatabaseBranch;
use regex::Regex;
use std::sync::OnceLock;

/// Prepended when a computed name would not start with a letter.
pub const LEADING_LETTER_PREFIX: &str = "branch-";

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9-]").expect("static regex"))
}

/// Derive the database branch name for a source branch.
///
/// Database branch names are alphanumeric plus hyphen and must start with a
/// letter. Every disallowed character becomes `-`.
pub fn database_branch_name(prefix: &str, head_ref: &str) -> String {
    let joined = format!("{prefix}{head_ref}");
    let name = disallowed_chars().replace_all(&joined, "-").into_owned();
    if name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name
    } else {
        format!("{LEADING_LETTER_PREFIX}{name}")
    }
}

fn find_branch(client: &RemoteClient, name: &str) -> Result<Option<DatabaseBranch>> {
    Ok(client
        .list_branches()?
        .into_iter()
        .find(|branch| branch.name == name))
}

/// Return the named branch, creating it and waiting for readiness if absent.
///
/// An existing branch is returned as listed, without waiting on `ready`.
pub fn ensure_branch(client: &RemoteClient, poller: &Poller, name: &str) -> Result<DatabaseBranch> {
    if let Some(existing) = find_branch(client, name)? {
        tracing::debug!(branch = name, ready = existing.ready, "database branch already exists");
        return Ok(existing);
    }

    tracing::info!(branch = name, "creating database branch");
    client.create_branch(name)?;

    let branch = poller.until("database branch to be ready", || {
        Ok(find_branch(client, name)?.filter(|b| b.ready))
    })?;
    tracing::info!(branch = name, "database branch is ready");
    Ok(branch)
}

/// Delete the named branch and wait until it no longer lists.
pub fn delete_branch(client: &RemoteClient, poller: &Poller, name: &str) -> Result<()> {
    tracing::info!(branch = name, "deleting database branch");
    client.delete_branch(name)?;
    poller.until("database branch to be deleted", || {
        Ok(find_branch(client, name)?.is_none().then_some(()))
    })?;
    tracing::info!(branch = name, "database branch deleted");
    Ok(())
}
