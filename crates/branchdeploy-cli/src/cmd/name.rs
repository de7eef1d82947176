use crate::output::print_json;
use branchdeploy_core::branch::database_branch_name;

pub fn run(prefix: &str, head_ref: &str, json: bool) -> anyhow::Result<()> {
    let name = database_branch_name(prefix, head_ref);
    if json {
        print_json(&serde_json::json!({
            "head_ref": head_ref,
            "prefix": prefix,
            "database_branch_name": name,
        }))?;
    } else {
        println!("{name}");
    }
    Ok(())
}
