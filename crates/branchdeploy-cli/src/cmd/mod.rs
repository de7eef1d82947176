pub mod cleanup;
pub mod create;
pub mod merge;
pub mod name;

use anyhow::Context;
use branchdeploy_core::{
    config::{self, GithubSettings, PipelineSettings, RemoteAuth},
    event::PullRequestEvent,
    handoff::{Handoff, OutputSink},
    lifecycle::{self, Lifecycle},
    poll::Poller,
    remote::{PscaleCli, RemoteClient},
    status::{GithubComments, MarkerLocator, StatusReporter},
};
use std::rc::Rc;

/// Everything a phase needs, resolved from the environment.
pub struct PhaseEnv {
    pub auth: RemoteAuth,
    pub github: GithubSettings,
    pub pipeline: PipelineSettings,
    pub event: PullRequestEvent,
}

impl PhaseEnv {
    /// Remote credentials are checked first so a misconfigured run fails
    /// before anything touches the network.
    pub fn load() -> anyhow::Result<Self> {
        let (auth, pipeline) = load_remote()?;
        let (github, event) = load_github()?;
        Ok(Self {
            auth,
            github,
            pipeline,
            event,
        })
    }

    /// Wire up the orchestrator. With `report_remote_failures`, every failed
    /// remote command is rendered onto the status comment as it happens.
    pub fn lifecycle(&self, report_remote_failures: bool) -> anyhow::Result<Lifecycle> {
        let reporter = reporter(&self.github, &self.event, &self.auth)?;
        let mut client = remote_client(&self.auth, &self.pipeline)?;
        if report_remote_failures {
            client = client.with_failure_hook(lifecycle::status_failure_hook(&reporter));
        }
        Ok(Lifecycle::new(
            client,
            Poller::new(self.pipeline.poll),
            reporter,
            Handoff::new(&self.pipeline.handoff_dir),
            OutputSink::new(self.pipeline.output_file.clone()),
        ))
    }
}

pub fn load_remote() -> anyhow::Result<(RemoteAuth, PipelineSettings)> {
    let lookup = config::env_lookup;
    let auth = RemoteAuth::from_lookup(&lookup)?;
    let pipeline = PipelineSettings::from_lookup(&lookup)?;
    Ok((auth, pipeline))
}

pub fn load_github() -> anyhow::Result<(GithubSettings, PullRequestEvent)> {
    let lookup = config::env_lookup;
    let github = GithubSettings::from_lookup(&lookup)?;
    let event_path = github
        .event_path
        .clone()
        .ok_or_else(|| branchdeploy_core::DeployError::missing(config::GITHUB_EVENT_PATH))?;
    let event = PullRequestEvent::load(&event_path)
        .with_context(|| format!("failed to read event payload {}", event_path.display()))?;
    Ok((github, event))
}

pub fn reporter(
    github: &GithubSettings,
    event: &PullRequestEvent,
    auth: &RemoteAuth,
) -> anyhow::Result<StatusReporter> {
    let issue = event.pull_request_number()?;
    let api = GithubComments::new(github).context("failed to build comment client")?;
    Ok(StatusReporter::new(
        Rc::new(api),
        Rc::new(MarkerLocator {
            bot_login: github.bot_login.clone(),
        }),
        issue,
        auth.service_token.clone(),
    ))
}

pub fn remote_client(auth: &RemoteAuth, pipeline: &PipelineSettings) -> anyhow::Result<RemoteClient> {
    let cli = PscaleCli::locate(pipeline.pscale_bin.as_deref())?;
    Ok(RemoteClient::new(auth.clone(), Box::new(cli)))
}
