use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use parley_application::SessionIdentityStore;
use parley_core::session::{INVALID_WORKSPACE_MARKER, Topic};
use parley_infrastructure::{InMemoryKeyValueStore, ParleyPaths, TomlKeyValueStore};

/// Prints the stored candidates, the topic bindings and the session the
/// resolver picks for `workspace`.
pub async fn run(paths: &ParleyPaths, workspace: &str, topic_ids: &[String]) -> Result<()> {
    let persisted = TomlKeyValueStore::new(paths).await?;
    let identity =
        SessionIdentityStore::new(Arc::new(InMemoryKeyValueStore::new()), Arc::new(persisted));

    let candidates = identity.candidates(workspace).await?;
    println!("{}", "Candidates".bold());
    println!("  scoped (persisted): {}", or_none(candidates.scoped_persisted.as_deref()));
    println!("  legacy:             {}", or_none(candidates.legacy.as_deref()));

    let bindings = identity
        .workspace_bindings(topic_ids.iter().map(String::as_str))
        .await?;
    println!("{}", "Topics".bold());
    for topic_id in topic_ids {
        let owner = match bindings.get(topic_id).map(String::as_str) {
            None => "unbound".dimmed(),
            Some(INVALID_WORKSPACE_MARKER) => "invalidated".red(),
            Some(owner) if owner == workspace => owner.green(),
            Some(owner) => owner.yellow(),
        };
        println!("  {} -> {}", topic_id, owner);
    }

    let topics: Vec<Topic> = topic_ids.iter().map(|id| Topic::new(id, id)).collect();
    match identity.resolve(workspace, &topics).await? {
        Some(session_id) => println!("{} {}", "Restores".green().bold(), session_id),
        None => println!("{}", "Nothing to restore".yellow()),
    }
    Ok(())
}

fn or_none(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
