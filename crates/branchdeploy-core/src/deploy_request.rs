//! Deploy-request reconciliation.
//!
//! At most one open deploy request is expected per branch. Selection always
//! filters to open requests for the branch and takes the first in list order;
//! a second open request is reported but never acted on.

use crate::error::Result;
use crate::poll::Poller;
use crate::remote::RemoteClient;
use crate::types::{DeployRequest, Diff};

/// Text attached to a newly created deploy request, linking back to its source.
pub fn provenance_comment(pull_request_url: &str) -> String {
    format!("This deploy request was automatically created by schema changes in {pull_request_url}")
}

/// First open deploy request for `branch`, in list order.
pub fn select_open<'a>(requests: &'a [DeployRequest], branch: &str) -> Option<&'a DeployRequest> {
    let mut open = requests
        .iter()
        .filter(|dr| dr.branch == branch && dr.is_open());
    let first = open.next()?;
    let others: Vec<u64> = open.map(|dr| dr.number).collect();
    if !others.is_empty() {
        tracing::warn!(
            branch,
            selected = first.number,
            ignored = ?others,
            "multiple open deploy requests for branch; using the first listed"
        );
    }
    Some(first)
}

/// The open deploy request for `branch`, if one exists. Never creates.
pub fn find_open_deploy_request(client: &RemoteClient, branch: &str) -> Result<Option<DeployRequest>> {
    let requests = client.list_deploy_requests()?;
    Ok(select_open(&requests, branch).cloned())
}

/// Find or create the open deploy request for `branch`.
///
/// A newly created request is annotated with `provenance` when given.
pub fn ensure_open_deploy_request(
    client: &RemoteClient,
    branch: &str,
    provenance: Option<&str>,
) -> Result<DeployRequest> {
    if let Some(existing) = find_open_deploy_request(client, branch)? {
        tracing::debug!(branch, number = existing.number, "found open deploy request");
        return Ok(existing);
    }

    tracing::info!(branch, "creating deploy request");
    let created = client.create_deploy_request(branch)?;
    if let Some(comment) = provenance {
        client.review_deploy_request(created.number, comment)?;
    }
    Ok(created)
}

pub fn compute_diff(client: &RemoteClient, number: u64) -> Result<Vec<Diff>> {
    client.diff_deploy_request(number)
}

/// Deploy `request` and wait until its deployment reports `finished_at`.
///
/// Approval is not checked here; the caller gates on it.
pub fn merge_deploy_request(
    client: &RemoteClient,
    poller: &Poller,
    request: &DeployRequest,
) -> Result<DeployRequest> {
    tracing::info!(branch = %request.branch, number = request.number, "deploying deploy request");
    client.deploy_deploy_request(request.number)?;

    let finished = poller.until("deploy request to finish deploying", || {
        Ok(client
            .list_deploy_requests()?
            .into_iter()
            .find(|dr| dr.id == request.id && dr.deployment_finished()))
    })?;
    tracing::info!(number = request.number, "deploy request deployed");
    Ok(finished)
}

pub fn close_deploy_request(client: &RemoteClient, request: &DeployRequest) -> Result<()> {
    tracing::info!(branch = %request.branch, number = request.number, "closing deploy request");
    client.close_deploy_request(request.number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::PollPolicy;
    use crate::testing::{test_auth, FakeRunner, RecordingSleeper};

    fn client(runner: &FakeRunner) -> RemoteClient {
        RemoteClient::new(test_auth(), Box::new(runner.clone()))
    }

    fn poller(sleeper: &RecordingSleeper) -> Poller {
        Poller::with_sleeper(PollPolicy::DEFAULT, Box::new(sleeper.clone()))
    }

    const MIXED: &str = r#"[
        {"id": "a", "number": 1, "branch": "b", "state": "closed"},
        {"id": "other", "number": 9, "branch": "c", "state": "open"},
        {"id": "two", "number": 2, "branch": "b", "state": "open"},
        {"id": "five", "number": 5, "branch": "b", "state": "open"}
    ]"#;

    #[test]
    fn selects_first_open_for_branch() {
        let runner = FakeRunner::default();
        runner.respond("deploy-request", "list", Ok(MIXED.into()));

        let dr = ensure_open_deploy_request(&client(&runner), "b", Some("note")).unwrap();

        assert_eq!(dr.number, 2);
        assert_eq!(runner.count("deploy-request", "create"), 0);
        assert_eq!(runner.count("deploy-request", "review"), 0);
    }

    #[test]
    fn creates_and_annotates_when_none_open() {
        let runner = FakeRunner::default();
        runner.respond(
            "deploy-request",
            "list",
            Ok(r#"[{"id": "a", "number": 1, "branch": "b", "state": "closed"}]"#.into()),
        );
        runner.respond(
            "deploy-request",
            "create",
            Ok(r#"{"id": "n", "number": 3, "branch": "b", "state": "open", "approved": false}"#.into()),
        );
        runner.respond("deploy-request", "review", Ok("{}".into()));

        let note = provenance_comment("https://github.com/acme/shop/pull/12");
        let dr = ensure_open_deploy_request(&client(&runner), "b", Some(&note)).unwrap();

        assert_eq!(dr.number, 3);
        assert_eq!(runner.verbs(), ["deploy-request list", "deploy-request create", "deploy-request review"]);
        let review = &runner.calls()[2];
        assert_eq!(review[3], "3");
        assert_eq!(review[5], note);
    }

    #[test]
    fn create_without_provenance_skips_review() {
        let runner = FakeRunner::default();
        runner.respond("deploy-request", "list", Ok("[]".into()));
        runner.respond(
            "deploy-request",
            "create",
            Ok(r#"{"id": "n", "number": 3, "branch": "b", "state": "open"}"#.into()),
        );
        ensure_open_deploy_request(&client(&runner), "b", None).unwrap();
        assert_eq!(runner.count("deploy-request", "review"), 0);
    }

    #[test]
    fn find_open_never_creates() {
        let runner = FakeRunner::default();
        runner.respond("deploy-request", "list", Ok("[]".into()));
        assert!(find_open_deploy_request(&client(&runner), "b").unwrap().is_none());
        assert_eq!(runner.verbs(), ["deploy-request list"]);
    }

    #[test]
    fn merge_polls_until_finished() {
        let runner = FakeRunner::default();
        let sleeper = RecordingSleeper::default();
        runner.respond("deploy-request", "deploy", Ok("{}".into()));
        let pending = r#"[{"id": "two", "number": 2, "branch": "b", "state": "open",
            "deployment": {"state": "queued", "finished_at": null}}]"#;
        let done = r#"[{"id": "two", "number": 2, "branch": "b", "state": "closed",
            "deployment": {"state": "complete", "finished_at": "2024-05-01T12:00:00Z"}}]"#;
        runner.respond("deploy-request", "list", Ok(pending.into()));
        runner.respond("deploy-request", "list", Ok(pending.into()));
        runner.respond("deploy-request", "list", Ok(done.into()));

        let request: DeployRequest = serde_json::from_str::<Vec<DeployRequest>>(pending)
            .unwrap()
            .remove(0);
        let merged = merge_deploy_request(&client(&runner), &poller(&sleeper), &request).unwrap();

        assert!(merged.deployment_finished());
        assert_eq!(runner.count("deploy-request", "list"), 3);
        assert_eq!(sleeper.sleeps().len(), 2);
        assert_eq!(runner.calls()[0][3], "2");
    }

    #[test]
    fn diff_parses_entries() {
        let runner = FakeRunner::default();
        runner.respond(
            "deploy-request",
            "diff",
            Ok(r#"[{"name": "users", "raw": "+ CREATE TABLE users", "html": "<p>"}]"#.into()),
        );
        let diffs = compute_diff(&client(&runner), 2).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].name, "users");
    }
}
