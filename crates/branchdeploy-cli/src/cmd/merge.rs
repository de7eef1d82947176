use super::PhaseEnv;
use crate::output::print_report;
use anyhow::Context;
use branchdeploy_core::branch;

pub fn run(json: bool) -> anyhow::Result<()> {
    let env = PhaseEnv::load()?;
    let head_ref = env.pipeline.require_head_ref()?;
    let branch = branch::database_branch_name(&env.pipeline.branch_prefix, head_ref);
    let intent = env.event.merge_intent();

    let report = env
        .lifecycle(true)?
        .merge(&branch, intent)
        .with_context(|| format!("merge phase failed for database branch '{branch}'"))?;
    print_report(&report, json)
}
