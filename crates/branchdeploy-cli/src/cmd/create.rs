use super::PhaseEnv;
use crate::output::print_report;
use anyhow::Context;
use branchdeploy_core::{branch, push::PushCommand};

pub fn run(json: bool) -> anyhow::Result<()> {
    let env = PhaseEnv::load()?;
    let head_ref = env.pipeline.require_head_ref()?;
    let branch = branch::database_branch_name(&env.pipeline.branch_prefix, head_ref);
    let pull_request = env.event.pull_request_number()?;

    let mut lifecycle = env
        .lifecycle(true)?
        .with_pull_request_url(env.github.pull_request_url(pull_request));
    if let Some(command) = &env.pipeline.push_command {
        lifecycle = lifecycle.with_push(PushCommand::new(
            command.clone(),
            env.pipeline.workspace.clone(),
        ));
    }

    let report = lifecycle
        .create(&branch)
        .with_context(|| format!("create phase failed for database branch '{branch}'"))?;
    print_report(&report, json)
}
