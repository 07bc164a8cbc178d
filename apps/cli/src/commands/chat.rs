//! Chat command implementation.

use colored::Colorize;
use sprout_orchestrator::{
    EngineConfig, InteractionResult, LearnerProfile, LearningOrchestrator, StudentInteraction,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Runs `messages` through the engine, or reads messages from stdin when
/// none are given.
pub async fn execute(
    config: EngineConfig,
    learner_id: &str,
    name: &str,
    age: u8,
    messages: Vec<String>,
) -> anyhow::Result<()> {
    let engine = super::start_engine(config).await?;
    let orchestrator = engine.orchestrator();
    orchestrator.initialize_learning_state(learner_id, LearnerProfile::new(name, age)).await;

    let outcome = if messages.is_empty() {
        interactive(orchestrator, learner_id, name).await
    } else {
        for message in messages {
            let result = orchestrator.process_student_interaction(learner_id, StudentInteraction::chat(message)).await;
            print_result(&result);
        }
        Ok(())
    };

    engine.stop().await;
    outcome
}

async fn interactive(orchestrator: &LearningOrchestrator, learner_id: &str, name: &str) -> anyhow::Result<()> {
    println!("{}", format!("Hi {name}! Type a message, or \"quit\" to stop.").bold().cyan());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }
        let result = orchestrator.process_student_interaction(learner_id, StudentInteraction::chat(line)).await;
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &InteractionResult) {
    println!("{} {}", "Sprout:".green().bold(), result.response);
    if !result.actions.is_empty() {
        println!("  {}", format!("[{}]", result.actions.join(", ")).dimmed());
    }
}
