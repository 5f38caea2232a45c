//! Sessions command - List chat sessions.

use anyhow::Result;
use clap::Args;

use dom_chat::{classify, ChatApi, ChatConfig, HttpChatClient};

use super::domain_failure;

#[derive(Args)]
pub struct SessionsArgs {
    /// Include archived sessions
    #[arg(short, long)]
    all: bool,
}

pub async fn execute(args: SessionsArgs, config: ChatConfig) -> Result<()> {
    let client = HttpChatClient::from_config(&config)?;
    let sessions = match client.list_sessions().await {
        Ok(sessions) => sessions,
        Err(e) => return Err(domain_failure(&classify(&e), "Failed to list sessions")),
    };

    let shown: Vec<_> = sessions
        .iter()
        .filter(|s| args.all || s.is_active)
        .collect();

    if shown.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for session in shown {
        println!(
            "{} {:<36}  {}  {}",
            if session.is_active { "●" } else { "○" },
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}
