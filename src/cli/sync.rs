//! CLI handlers for the pull and upload steps.

use std::sync::Arc;

use crate::auth::TokenProvider;
use crate::config::Settings;
use crate::error::Result;
use crate::sync::{SyncJob, SyncReport, SyncSteps};

use super::Cli;

/// Handle `sharesync pull`, `upload` and `run`.
pub async fn handle_sync(cli: &Cli, steps: SyncSteps) -> Result<()> {
    let settings = Settings::load(&cli.setup)?;
    let mut job = SyncJob::new(settings.clone());
    if steps.upload {
        let provider = TokenProvider::new(settings.auth, &cli.store_config())?;
        job = job.with_tokens(Arc::new(provider));
    }

    let report = job.run(steps).await?;
    print_report(&report, steps);
    Ok(())
}

fn print_report(report: &SyncReport, steps: SyncSteps) {
    if steps.pull {
        let failed = report.failed_pulls();
        let total = report.pulls.len();
        if failed == 0 {
            println!("✅ Pulled from {total} target(s)");
        } else {
            println!("⚠️  Pulled from {} of {total} target(s)", total - failed);
            for pull in report.pulls.iter().filter(|p| !p.succeeded()) {
                println!("   {}@{}: {}", pull.target.username, pull.target.ip, pull.stderr);
            }
        }
    }
    if steps.upload {
        println!("✅ Uploaded {} file(s)", report.uploads.uploaded.len());
        if !report.uploads.skipped.is_empty() {
            println!("⚠️  Skipped {} file(s)", report.uploads.skipped.len());
        }
    }
}
