//! Chat command - Interactive chat session.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use dom_chat::{ChatConfig, ChatEvent, SessionOrchestrator};

use super::{connect, domain_failure, print_attachment, print_ic5, read_upload};

#[derive(Args)]
pub struct ChatArgs {
    /// Start with research mode enabled
    #[arg(short, long)]
    research: bool,
}

/// A line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input {
    Say(String),
    Reset,
    Attach(Vec<PathBuf>),
    Remove(String),
    Research(bool),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("reset"), None) => Input::Reset,
        (Some("attach"), Some(first)) => Input::Attach(
            std::iter::once(first)
                .chain(parts)
                .map(PathBuf::from)
                .collect(),
        ),
        (Some("remove"), Some(id)) => Input::Remove(id.to_string()),
        (Some("research"), Some("on")) => Input::Research(true),
        (Some("research"), Some("off")) => Input::Research(false),
        (Some("status"), None) => Input::Status,
        (Some("help"), None) => Input::Help,
        (Some("quit"), None) | (Some("exit"), None) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

pub async fn execute(args: ChatArgs, config: ChatConfig) -> Result<()> {
    let mut research = args.research || config.session.research_mode;
    let mut chat = connect(&config)?;

    if !chat.initialize().await {
        let error = chat.error().cloned().context("Session could not be created")?;
        return Err(domain_failure(&error, "Failed to start a chat session"));
    }

    info!("Chat session {} started", chat.session_id().unwrap_or_default());
    println!("💬 Connected. Type a message, or /help for commands.");
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let busy = chat.is_busy();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Quit => break,
                    input => handle_input(&mut chat, input, &mut research).await?,
                }
                report_error(&mut chat);
                if !chat.is_busy() {
                    prompt();
                }
            }
            event = chat.next_event(), if busy => {
                if let Some(event) = event {
                    render_event(&chat, event);
                }
                report_error(&mut chat);
                if !chat.is_busy() {
                    prompt();
                }
            }
        }
    }

    chat.close_stream();
    println!("👋 Bye");
    Ok(())
}

async fn handle_input(chat: &mut SessionOrchestrator, input: Input, research: &mut bool) -> Result<()> {
    match input {
        Input::Say(text) => {
            if chat.is_busy() {
                println!("⏳ Still working on the previous turn or an upload.");
            } else if chat.submit_turn(&text, *research).await {
                println!();
            }
        }
        Input::Reset => {
            if chat.reset().await {
                println!("🔄 Started a new session.");
            }
        }
        Input::Attach(paths) => {
            let mut files = Vec::new();
            for path in &paths {
                match read_upload(path) {
                    Ok(file) => files.push(file),
                    Err(e) => println!("❌ {:#}", e),
                }
            }
            for id in chat.attach(files) {
                println!("📎 Attached {}", id);
            }
        }
        Input::Remove(id) => {
            if chat.remove_attachment(&id) {
                println!("🗑️  Removed {}", id);
            } else {
                println!("No attachment {}", id);
            }
        }
        Input::Research(enabled) => {
            *research = enabled;
            println!("🔎 Research mode {}", if enabled { "on" } else { "off" });
        }
        Input::Status => print_status(chat, *research),
        Input::Help => print_help(),
        Input::Unknown(line) => println!("Unknown command: {} (try /help)", line),
        Input::Empty | Input::Quit => {}
    }
    Ok(())
}

fn render_event(chat: &SessionOrchestrator, event: ChatEvent) {
    match event {
        ChatEvent::Token(token) => {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        }
        ChatEvent::TurnCompleted(_) => {
            println!();
            if let Some(record) = chat.ic5() {
                print_ic5(record);
            }
        }
        ChatEvent::TurnFailed(_) => println!(),
        ChatEvent::AttachmentSettled(attachment) => print_attachment(&attachment),
    }
}

fn report_error(chat: &mut SessionOrchestrator) {
    if let Some(message) = chat.error_message() {
        println!("❌ {}", message);
        chat.dismiss_error();
    }
}

fn print_status(chat: &SessionOrchestrator, research: bool) {
    println!("Session:  {}", chat.session_id().unwrap_or("-"));
    println!("Messages: {}", chat.history().len());
    println!("Busy:     {}", chat.is_busy());
    println!("Research: {}", if research { "on" } else { "off" });
    if chat.attachments().is_empty() {
        println!("Attachments: none");
    } else {
        println!("Attachments:");
        for attachment in chat.attachments() {
            print_attachment(attachment);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /reset               Start a new session");
    println!("  /attach <path>...    Upload files into this session");
    println!("  /remove <id>         Remove an attachment");
    println!("  /research on|off     Toggle research mode");
    println!("  /status              Show session state");
    println!("  /quit                Leave");
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  hello there "), Input::Say("hello there".into()));
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(parse_input("/reset"), Input::Reset);
        assert_eq!(
            parse_input("/attach a.pdf docs/b.md"),
            Input::Attach(vec![PathBuf::from("a.pdf"), PathBuf::from("docs/b.md")])
        );
        assert_eq!(parse_input("/remove att-1"), Input::Remove("att-1".into()));
        assert_eq!(parse_input("/research on"), Input::Research(true));
        assert_eq!(parse_input("/research off"), Input::Research(false));
        assert_eq!(parse_input("/quit"), Input::Quit);
    }

    #[test]
    fn test_malformed_commands_are_unknown() {
        assert_eq!(parse_input("/attach"), Input::Unknown("/attach".into()));
        assert_eq!(parse_input("/research maybe"), Input::Unknown("/research maybe".into()));
        assert_eq!(parse_input("/dance"), Input::Unknown("/dance".into()));
    }
}
