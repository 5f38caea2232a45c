//! Ask command - One-shot question.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use dom_chat::{AttachmentStatus, ChatConfig, ChatEvent};

use super::{connect, domain_failure, print_attachment, print_ic5, read_upload};

#[derive(Args)]
pub struct AskArgs {
    /// The question to ask
    #[arg(required = true)]
    text: Vec<String>,

    /// Let the assistant research beyond the knowledge base
    #[arg(short, long)]
    research: bool,

    /// File to upload into the session before asking (repeatable)
    #[arg(short, long)]
    attach: Vec<PathBuf>,

    /// Print only the reply text, without the IC-5 summary
    #[arg(long)]
    plain: bool,
}

pub async fn execute(args: AskArgs, config: ChatConfig) -> Result<()> {
    let text = args.text.join(" ");
    let research = args.research || config.session.research_mode;

    let files = args
        .attach
        .iter()
        .map(|path| read_upload(path))
        .collect::<Result<Vec<_>>>()?;

    let mut chat = connect(&config)?;
    if !chat.initialize().await {
        let error = chat.error().cloned().context("Session could not be created")?;
        return Err(domain_failure(&error, "Failed to start a chat session"));
    }

    if !files.is_empty() {
        println!("📎 Uploading {} file(s)...", files.len());
        chat.attach(files);
        for event in chat.settle().await {
            if let ChatEvent::AttachmentSettled(attachment) = event {
                print_attachment(&attachment);
            }
        }
        for attachment in chat.attachments() {
            if attachment.status == AttachmentStatus::Failed {
                warn!("Continuing without {}", attachment.file_name);
            }
        }
    }

    info!(research, "Asking: {}", text);
    if !chat.submit_turn(&text, research).await {
        let error = chat.error().cloned().context("The question was not sent")?;
        return Err(domain_failure(&error, "Failed to send the question"));
    }

    while let Some(event) = chat.next_event().await {
        match event {
            ChatEvent::Token(token) => {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            }
            ChatEvent::TurnCompleted(_) => println!(),
            ChatEvent::TurnFailed(error) => {
                println!();
                return Err(domain_failure(&error, "The reply was interrupted"));
            }
            ChatEvent::AttachmentSettled(_) => {}
        }
    }

    if !args.plain {
        if let Some(record) = chat.ic5() {
            print_ic5(record);
        }
    }
    Ok(())
}
