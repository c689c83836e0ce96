use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use parley_application::{ChatOrchestrator, OutgoingMessage, SessionIdentityStore};
use parley_core::config::EngineConfig;
use parley_core::content::ContentPart;
use parley_core::message::{Message, ToolCallStatus};
use parley_core::notification::TracingNotifier;
use parley_core::sound::SilentSoundCues;
use parley_core::stream::EventHub;
use parley_infrastructure::{InMemoryKeyValueStore, ReplayBackend};

/// Replays `script` as the backend's answer to `message` and prints the
/// assembled assistant message.
///
/// Session state lives in memory only, so a replay never touches the stored
/// session identity.
pub async fn run(
    engine: &EngineConfig,
    script: &Path,
    workspace: &str,
    message: &str,
    json: bool,
) -> Result<()> {
    let hub = Arc::new(EventHub::new());
    let backend = ReplayBackend::from_jsonl(hub.clone(), script)
        .with_context(|| format!("Failed to load script {}", script.display()))?;
    let identity = SessionIdentityStore::new(
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(InMemoryKeyValueStore::new()),
    );
    let orchestrator = ChatOrchestrator::new(
        Arc::new(backend),
        hub,
        identity,
        Arc::new(TracingNotifier),
        Arc::new(SilentSoundCues),
        engine.clone(),
    );

    orchestrator.switch_workspace(workspace).await?;
    let message_id = orchestrator
        .send_message(OutgoingMessage::text(message))
        .await?
        .context("Message was not sent")?;

    if orchestrator.snapshot().is_sending {
        tracing::warn!("Script ended without final_done or error; stopping");
        orchestrator.stop_sending();
    }

    let snapshot = orchestrator.snapshot();
    orchestrator.shutdown();
    let reply = snapshot
        .message(&message_id)
        .context("Assistant message disappeared")?;

    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
    } else {
        print_message(reply);
        if let Some(session_id) = &snapshot.session_id {
            println!("{}", format!("session {}", session_id).dimmed());
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    for part in &message.content_parts {
        match part {
            ContentPart::Text { text } => println!("{}", text),
            ContentPart::Thinking { text } => {
                println!("{}", format!("[thinking] {}", text).dimmed().italic())
            }
            ContentPart::ToolUse { tool_call } => {
                let status = match tool_call.status {
                    ToolCallStatus::Running => tool_call.status.to_string().yellow(),
                    ToolCallStatus::Completed => tool_call.status.to_string().green(),
                    ToolCallStatus::Failed => tool_call.status.to_string().red(),
                };
                println!("{} {} ({})", "[tool]".cyan(), tool_call.name, status);
            }
            ContentPart::ActionRequired { action_required } => {
                println!(
                    "{} {}: {}",
                    "[action required]".yellow().bold(),
                    action_required.action_type,
                    action_required.prompt.as_deref().unwrap_or("-")
                );
            }
        }
    }
}
