mod cmd;
mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "branchdeploy",
    about = "Drive database branches and deploy requests from pull-request pipelines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the database branch, issue a credential and open a deploy request
    Create,

    /// Deploy the approved deploy request once the pull request is merged
    Merge,

    /// Delete the temporary credential recorded by the create phase
    Cleanup,

    /// Print the database branch name for a source branch
    Name {
        /// Prepended to the source branch name
        #[arg(long, env = "PLANETSCALE_BRANCH_PREFIX", default_value = "")]
        prefix: String,

        /// Source branch of the pull request
        #[arg(long, env = "GITHUB_HEAD_REF")]
        head_ref: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Create => cmd::create::run(cli.json),
        Commands::Merge => cmd::merge::run(cli.json),
        Commands::Cleanup => cmd::cleanup::run(cli.json),
        Commands::Name { prefix, head_ref } => cmd::name::run(&prefix, &head_ref, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
