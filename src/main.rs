//! sharesync CLI binary entry point.

use clap::Parser;
use sharesync::cli::{auth, sync, Cli, Commands};
use sharesync::sync::SyncSteps;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let guard = sharesync::logging::init(&cli.log_dir);

    let result = match cli.command {
        Commands::Login => auth::handle_login(&cli).await,
        Commands::Status => auth::handle_status(&cli),
        Commands::Logout => auth::handle_logout(&cli),
        Commands::Pull => sync::handle_sync(&cli, SyncSteps::PULL_ONLY).await,
        Commands::Upload => sync::handle_sync(&cli, SyncSteps::UPLOAD_ONLY).await,
        Commands::Run => sync::handle_sync(&cli, SyncSteps::ALL).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
