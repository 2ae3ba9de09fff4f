mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Prepare(dataset) => {
            let settings = dataset.into_settings()?;
            rootcause_core::Preparation::new(&settings)
                .get()
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| "preparing dataset")?;
        }
        Commands::Search { dataset, error_line_id } => {
            let settings = dataset.into_settings()?;
            let root_cause = rootcause_core::search(&settings, error_line_id)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("searching for root cause of line {error_line_id}"))?;
            if let rootcause_core::Output::Silent = settings.output {
                for entry in &root_cause.entries {
                    println!("{}", entry.line_id);
                }
            }
        }
    }
    Ok(())
}
