use branchdeploy_core::handoff::OUT_URL;
use branchdeploy_core::lifecycle::PhaseReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a phase report. Text mode never prints the connection URL.
pub fn print_report(report: &PhaseReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    println!("{}: {} ({})", report.phase, report.state, report.branch);
    if let Some(number) = report.deploy_request {
        println!("  deploy request: #{number}");
    }
    if let Some(detail) = &report.detail {
        println!("  {detail}");
    }
    for (key, value) in &report.outputs {
        if key != OUT_URL {
            println!("  {key}: {value}");
        }
    }
    Ok(())
}
