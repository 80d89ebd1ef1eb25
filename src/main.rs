//! Impersonation gateway binary.
//!
//! Parses the command line and hands over to [`startup::launch`].

use clap::Parser;

use impersonation_gateway::config::Cli;
use impersonation_gateway::lifecycle::startup;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Err(e) = startup::launch(cli).await {
        tracing::error!(error = %e, "Gateway stopped with an error");
        return Err(e.into());
    }
    Ok(())
}
