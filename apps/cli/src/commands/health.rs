//! Health command implementation.

use colored::Colorize;
use sprout_orchestrator::{AgentHealthReport, EngineConfig, RecoveryState};

/// Starts the engine, runs one health poll and prints it.
pub async fn execute(config: EngineConfig, json_output: bool) -> anyhow::Result<()> {
    let engine = super::start_engine(config).await?;
    let reports = engine.health_report().await;
    engine.stop().await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&reports);
    }
    Ok(())
}

fn print_reports(reports: &[AgentHealthReport]) {
    println!("{}", "Agent health".bold().cyan());
    for report in reports {
        let status = if report.status.healthy { "healthy".green() } else { "unhealthy".red() };
        let recovery = match report.recovery {
            RecoveryState::Healthy => report.recovery.as_str().normal(),
            RecoveryState::Recovering => report.recovery.as_str().yellow(),
            RecoveryState::Degraded => report.recovery.as_str().red(),
        };
        print!(
            "  {:<20} {:<10} recovery: {:<11} errors: {}",
            report.status.agent.as_str(),
            status,
            recovery,
            report.status.error_count
        );
        if let Some(mode) = report.fallback {
            print!("  fallback: {mode}");
        }
        println!();
    }
}
