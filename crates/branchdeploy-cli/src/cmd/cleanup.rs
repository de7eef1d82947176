use crate::output::print_report;
use anyhow::Context;
use branchdeploy_core::{
    handoff::{Handoff, OutputSink},
    lifecycle::Lifecycle,
    poll::Poller,
};

/// Only the remote credentials are required. Without a usable comment API the
/// status refresh is skipped and the credential is still deleted.
///
/// Remote failures here are logged, not rendered: a credential that is
/// already gone must not overwrite the status of an earlier phase.
pub fn run(json: bool) -> anyhow::Result<()> {
    let (auth, pipeline) = super::load_remote()?;
    let client = super::remote_client(&auth, &pipeline)?;
    let poller = Poller::new(pipeline.poll);
    let handoff = Handoff::new(&pipeline.handoff_dir);
    let outputs = OutputSink::new(pipeline.output_file.clone());

    let status = super::load_github()
        .and_then(|(github, event)| super::reporter(&github, &event, &auth));
    let lifecycle = match status {
        Ok(reporter) => Lifecycle::new(client, poller, reporter, handoff, outputs),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "status comment unavailable; cleaning up without it");
            Lifecycle::without_status(client, poller, handoff, outputs)
        }
    };

    let report = lifecycle.cleanup().context("cleanup phase failed")?;
    print_report(&report, json)
}
