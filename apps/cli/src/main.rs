//! LeadForge CLI: lead management, staged enrichment, scoring, and
//! campaign generation from the terminal.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;
use leadforge_shared::LeadForgeError;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    match commands::run(cli).await {
        Ok(()) => Ok(()),
        Err(report) => match report.downcast_ref::<LeadForgeError>() {
            Some(err) => {
                tracing::debug!(error = ?err, "command failed");
                eprintln!("error: {}", err.user_message());
                std::process::exit(1);
            }
            None => Err(report),
        },
    }
}
