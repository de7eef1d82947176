//! Deploy-request lifecycle orchestrator.
//!
//! Three phases run as separate processes in the same pipeline:
//!
//! - **create**: ensure the database branch, issue a credential, optionally
//!   push the schema, find or open the deploy request, report status.
//! - **merge**: on a merged pull request, deploy the approved deploy request,
//!   wait for it to finish and delete the branch. A pull request closed
//!   without merging closes the deploy request instead.
//! - **cleanup**: refresh the status comment and delete the credential. The
//!   outer pipeline schedules this regardless of earlier failures.
//!
//! Only the branch name and credential name cross the process boundary
//! (see [`crate::handoff`]). Everything else is re-discovered remotely.

use crate::branch;
use crate::credential;
use crate::deploy_request;
use crate::error::{DeployError, Result};
use crate::event::MergeIntent;
use crate::handoff::{
    Handoff, OutputSink, OUT_BRANCH, OUT_CREDENTIAL, OUT_DR_APPROVED, OUT_DR_NUMBER, OUT_DR_STATE,
    OUT_URL,
};
use crate::poll::Poller;
use crate::push::PushCommand;
use crate::remote::{FailureHook, RemoteClient};
use crate::status::{DeployRequestLink, StatusReporter, StatusView};
use crate::types::{DeployRequest, Diff};
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// LifecycleState / Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    PendingBranch,
    BranchReady,
    CredentialIssued,
    DeployRequestOpen,
    AwaitingApproval,
    Approved,
    Merging,
    Merged,
    /// Pull request closed without merging; deploy request closed.
    Closed,
    /// The phase had nothing to act on.
    Skipped,
    CleanedUp,
    Failed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::PendingBranch => "PENDING_BRANCH",
            LifecycleState::BranchReady => "BRANCH_READY",
            LifecycleState::CredentialIssued => "CREDENTIAL_ISSUED",
            LifecycleState::DeployRequestOpen => "DEPLOY_REQUEST_OPEN",
            LifecycleState::AwaitingApproval => "AWAITING_APPROVAL",
            LifecycleState::Approved => "APPROVED",
            LifecycleState::Merging => "MERGING",
            LifecycleState::Merged => "MERGED",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::Skipped => "SKIPPED",
            LifecycleState::CleanedUp => "CLEANED_UP",
            LifecycleState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Create,
    Merge,
    Cleanup,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Merge => "merge",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a phase did, for the CLI to print.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub state: LifecycleState,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_request: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

/// Failure hook that renders the error onto the status comment.
pub fn status_failure_hook(reporter: &StatusReporter) -> FailureHook {
    let reporter = reporter.clone();
    Box::new(move |error: &str| reporter.report_failure(error))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct Lifecycle {
    client: RemoteClient,
    poller: Poller,
    reporter: Option<StatusReporter>,
    handoff: Handoff,
    outputs: OutputSink,
    push: Option<PushCommand>,
    pull_request_url: Option<String>,
    state: Cell<LifecycleState>,
}

impl Lifecycle {
    pub fn new(
        client: RemoteClient,
        poller: Poller,
        reporter: StatusReporter,
        handoff: Handoff,
        outputs: OutputSink,
    ) -> Self {
        Self {
            reporter: Some(reporter),
            ..Self::without_status(client, poller, handoff, outputs)
        }
    }

    /// A lifecycle with no access to the status comment. Cleanup runs this
    /// way when the comment API is not configured, so the credential is
    /// still deleted.
    pub fn without_status(
        client: RemoteClient,
        poller: Poller,
        handoff: Handoff,
        outputs: OutputSink,
    ) -> Self {
        Self {
            client,
            poller,
            reporter: None,
            handoff,
            outputs,
            push: None,
            pull_request_url: None,
            state: Cell::new(LifecycleState::PendingBranch),
        }
    }

    /// Run a schema push between credential issue and deploy-request lookup.
    pub fn with_push(mut self, push: PushCommand) -> Self {
        self.push = Some(push);
        self
    }

    /// Referenced in the provenance note of newly created deploy requests.
    pub fn with_pull_request_url(mut self, url: impl Into<String>) -> Self {
        self.pull_request_url = Some(url.into());
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    fn enter(&self, state: LifecycleState) {
        tracing::info!(from = %self.state.get(), to = %state, "lifecycle transition");
        self.state.set(state);
    }

    /// Mark the phase failed and make sure the status comment says so.
    /// Remote command failures were already reported by the client's hook.
    fn guard(&self, phase: Phase, result: Result<PhaseReport>) -> Result<PhaseReport> {
        if let Err(e) = &result {
            self.enter(LifecycleState::Failed);
            tracing::error!(%phase, error = %e, "phase failed");
            match &self.reporter {
                Some(reporter) if !e.is_remote() => reporter.report_failure(&e.to_string()),
                _ => {}
            }
        }
        result
    }

    fn link(&self, request: &DeployRequest) -> DeployRequestLink {
        let auth = self.client.auth();
        DeployRequestLink {
            number: request.number,
            branch: request.branch.clone(),
            org: auth.org.clone(),
            database: auth.database.clone(),
        }
    }

    fn approval_view(&self, request: &DeployRequest, diffs: Vec<Diff>) -> StatusView {
        let link = self.link(request);
        if request.approved {
            StatusView::Approved { link, diffs }
        } else {
            StatusView::AwaitingApproval { link, diffs }
        }
    }

    fn phase_report(&self, phase: Phase, branch: &str) -> PhaseReport {
        PhaseReport {
            phase,
            state: self.state.get(),
            branch: branch.to_string(),
            deploy_request: None,
            detail: None,
            outputs: BTreeMap::new(),
        }
    }

    fn show(&self, view: &StatusView) -> Result<()> {
        if let Some(reporter) = &self.reporter {
            reporter.report(view)?;
        }
        Ok(())
    }

    // -- create -------------------------------------------------------------

    pub fn create(&self, branch: &str) -> Result<PhaseReport> {
        let result = self.run_create(branch);
        self.guard(Phase::Create, result)
    }

    fn run_create(&self, branch: &str) -> Result<PhaseReport> {
        let mut outputs = BTreeMap::new();
        self.enter(LifecycleState::PendingBranch);
        self.outputs.publish(&mut outputs, OUT_BRANCH, branch)?;
        self.handoff.write_branch_name(branch)?;
        if let Some(reporter) = &self.reporter {
            reporter.find_or_create()?;
        }

        branch::ensure_branch(&self.client, &self.poller, branch)?;
        self.enter(LifecycleState::BranchReady);

        let issued = credential::issue_password(&self.client, branch)?;
        self.handoff.write_credential_name(issued.name())?;
        let credential = issued.into_credential()?;
        self.outputs
            .publish(&mut outputs, OUT_URL, credential.connection_url.clone())?;
        self.outputs
            .publish(&mut outputs, OUT_CREDENTIAL, credential.name.clone())?;
        self.enter(LifecycleState::CredentialIssued);

        if let Some(push) = &self.push {
            push.run(&credential.connection_url, &self.client.auth().service_token)?;
        }

        let provenance = self
            .pull_request_url
            .as_deref()
            .map(deploy_request::provenance_comment);
        let request =
            deploy_request::ensure_open_deploy_request(&self.client, branch, provenance.as_deref())?;
        self.enter(LifecycleState::DeployRequestOpen);
        self.outputs
            .publish(&mut outputs, OUT_DR_NUMBER, request.number.to_string())?;
        self.outputs
            .publish(&mut outputs, OUT_DR_STATE, request.state.as_str())?;
        self.outputs
            .publish(&mut outputs, OUT_DR_APPROVED, request.approved.to_string())?;

        let diffs = deploy_request::compute_diff(&self.client, request.number)?;
        self.show(&self.approval_view(&request, diffs))?;
        self.enter(if request.approved {
            LifecycleState::Approved
        } else {
            LifecycleState::AwaitingApproval
        });

        Ok(PhaseReport {
            deploy_request: Some(request.number),
            outputs,
            ..self.phase_report(Phase::Create, branch)
        })
    }

    // -- merge --------------------------------------------------------------

    pub fn merge(&self, branch: &str, intent: MergeIntent) -> Result<PhaseReport> {
        let result = self.run_merge(branch, intent);
        self.guard(Phase::Merge, result)
    }

    fn run_merge(&self, branch: &str, intent: MergeIntent) -> Result<PhaseReport> {
        let Some(request) = deploy_request::find_open_deploy_request(&self.client, branch)? else {
            tracing::info!(branch, "no open deploy request for branch");
            self.enter(LifecycleState::Skipped);
            return Ok(PhaseReport {
                detail: Some(format!("no open deploy request for {branch}")),
                ..self.phase_report(Phase::Merge, branch)
            });
        };
        self.enter(LifecycleState::DeployRequestOpen);
        let link = self.link(&request);

        match intent {
            MergeIntent::Skip => {
                tracing::info!(branch, "pull request is not merged");
                self.enter(LifecycleState::Skipped);
                return Ok(PhaseReport {
                    deploy_request: Some(request.number),
                    detail: Some("pull request is not merged".to_string()),
                    ..self.phase_report(Phase::Merge, branch)
                });
            }
            MergeIntent::Close => {
                deploy_request::close_deploy_request(&self.client, &request)?;
                self.show(&StatusView::Closed { link })?;
                self.enter(LifecycleState::Closed);
                return Ok(PhaseReport {
                    deploy_request: Some(request.number),
                    ..self.phase_report(Phase::Merge, branch)
                });
            }
            MergeIntent::Merge => {}
        }

        if !request.approved {
            self.enter(LifecycleState::AwaitingApproval);
            return Err(DeployError::Approval {
                branch: branch.to_string(),
            });
        }
        self.enter(LifecycleState::Approved);

        self.show(&StatusView::Merging { link: link.clone() })?;
        self.enter(LifecycleState::Merging);
        deploy_request::merge_deploy_request(&self.client, &self.poller, &request)?;
        self.enter(LifecycleState::Merged);

        branch::delete_branch(&self.client, &self.poller, branch)?;
        self.show(&StatusView::Merged { link })?;

        Ok(PhaseReport {
            deploy_request: Some(request.number),
            ..self.phase_report(Phase::Merge, branch)
        })
    }

    // -- cleanup ------------------------------------------------------------

    /// Delete the credential recorded by the create phase. Runs regardless of
    /// how earlier phases ended; a failed delete is logged, not raised.
    pub fn cleanup(&self) -> Result<PhaseReport> {
        let branch = self.handoff.read_branch_name()?;
        let mut detail = None;

        if let Err(e) = self.refresh_status(&branch) {
            tracing::warn!(branch = %branch, error = %e, "could not refresh status comment");
        }

        match self.handoff.read_credential_name()? {
            None => {
                tracing::warn!(branch = %branch, "no temporary credential recorded; nothing to delete");
                detail = Some("no temporary credential recorded".to_string());
            }
            Some(name) => {
                if let Err(e) = credential::delete_credential(&self.client, &branch, &name) {
                    tracing::warn!(credential = %name, error = %e, "could not delete temporary credential");
                    detail = Some(format!("credential {name} was not deleted: {e}"));
                }
            }
        }

        self.enter(LifecycleState::CleanedUp);
        Ok(PhaseReport {
            detail,
            ..self.phase_report(Phase::Cleanup, &branch)
        })
    }

    /// Re-render the status comment so it carries the final diff. A comment
    /// that reports a failure is left as it is.
    fn refresh_status(&self, branch: &str) -> Result<()> {
        let Some(reporter) = &self.reporter else {
            return Ok(());
        };
        let Some(message) = reporter.current()? else {
            return Ok(());
        };
        if message.shows_failure() {
            tracing::info!(branch, "status comment reports a failure; not refreshing");
            return Ok(());
        }
        let Some(request) = deploy_request::find_open_deploy_request(&self.client, branch)? else {
            return Ok(());
        };
        let diffs = deploy_request::compute_diff(&self.client, request.number)?;
        reporter.update(&message, &reporter.render(&self.approval_view(&request, diffs)))?;
        Ok(())
    }
}
