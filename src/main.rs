use multideploy::presentation::cli::{Cli, CliApp};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins, otherwise --verbose selects debug for this crate
    let default_filter = if cli.verbose {
        "multideploy=debug,warn"
    } else {
        "multideploy=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    CliApp::from_cli(cli).run().await
}
