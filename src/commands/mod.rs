// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports the sync and validate commands

use crate::config::MirrorConfig;
use crate::mirror::SyncOrchestrator;
use anyhow::Result;

/// Run one end-to-end mirror pass and print the summary.
pub async fn sync(config: MirrorConfig, json: bool) -> Result<()> {
    let table = config.table.clone();
    let orchestrator = SyncOrchestrator::new(config)?;
    let report = orchestrator.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Mirrored {}: {} inserted, {} updated, {} deleted ({} source rows)",
            table, report.inserted, report.updated, report.deleted, report.source_rows
        );
    }
    Ok(())
}

/// Check that both databases are ready for mirroring without writing.
pub async fn validate(config: MirrorConfig) -> Result<()> {
    let table = config.table.clone();
    let orchestrator = SyncOrchestrator::new(config)?;
    orchestrator.preflight().await?;
    println!("Validation passed: table {} is ready to mirror.", table);
    Ok(())
}
