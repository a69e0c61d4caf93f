use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Parse CLI arguments first to get verbosity level
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli::commands::load_config(cli.config.as_deref(), cli.root.as_deref())?;
    debug!("Effective config: {:?}", config);

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Watch(args) => runtime.block_on(cli::commands::watch::execute(config, args))?,
        Commands::Check(args) => runtime.block_on(cli::commands::check::execute(config, args))?,
        Commands::Ignore(command) => {
            runtime.block_on(cli::commands::ignore::execute(config, command))?
        }
        Commands::Status(args) => runtime.block_on(cli::commands::status::execute(config, args))?,
    }

    Ok(())
}
