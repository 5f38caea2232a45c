//! CLI command definitions.
//!
//! This module defines the command structure for the DOM assistant CLI and
//! the helpers the commands share.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use dom_chat::{
    format_file_size, Attachment, ChatConfig, DomainError, HttpChatClient, Ic5Record,
    SessionOrchestrator, UploadFile,
};

pub mod ask;
pub mod chat;
pub mod sessions;

/// DOM assistant - decision support chat from the terminal
#[derive(Parser)]
#[command(name = "dom")]
#[command(version, about = "DOM assistant - decision support chat from the terminal")]
#[command(long_about = r#"
Talk to the DOM assistant from a terminal. Replies stream as they are
generated and each finished reply is summarized as an IC-5 record
(Decision / Why / Next 3 Actions).

COMMANDS:
  chat      → Interactive session (/reset, /attach, /remove, /research, /status, /quit)
  ask       → One-shot question, optionally with attached files
  sessions  → List your chat sessions

CONFIGURATION:
  --config <file> or DOM_API_BASE_URL, DOM_REQUEST_TIMEOUT_SECS,
  DOM_ACCESS_TOKEN, DOM_MAX_UPLOAD_BYTES

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Authentication required
  4 - Server or network failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "DOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Chat(chat::ChatArgs),

    /// Ask a single question and print the reply
    Ask(ask::AskArgs),

    /// List chat sessions
    Sessions(sessions::SessionsArgs),
}

/// Load configuration from a file or the environment, then apply CLI overrides.
pub fn load_config(path: Option<&Path>, base_url: Option<&str>) -> Result<ChatConfig> {
    let mut config = match path {
        Some(path) => ChatConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ChatConfig::from_env().context("Invalid configuration in environment")?,
    };

    if let Some(url) = base_url {
        config.api.base_url = url.to_string();
        config.validate().context("Invalid --base-url")?;
    }
    Ok(config)
}

/// Build an orchestrator talking to the configured backend.
pub fn connect(config: &ChatConfig) -> Result<SessionOrchestrator> {
    let client = HttpChatClient::from_config(config).context("Failed to create HTTP client")?;
    Ok(SessionOrchestrator::new(Arc::new(client))
        .with_config(config)
        .with_auth_redirect(|_| {
            warn!("Not signed in. Set DOM_ACCESS_TOKEN to a valid token and try again.");
        }))
}

/// Read a file from disk for upload.
pub fn read_upload(path: &Path) -> Result<UploadFile> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Not a file: {}", path.display()))?;

    let file = UploadFile::new(name, data);
    Ok(match content_type_for(path) {
        Some(mime) => file.content_type(mime),
        None => file,
    })
}

/// MIME type for the document formats the backend ingests.
fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}

/// Turn a surfaced error into a command failure, keeping it downcastable.
pub fn domain_failure(error: &DomainError, context: &'static str) -> anyhow::Error {
    anyhow::Error::new(error.clone()).context(context)
}

pub fn print_attachment(attachment: &Attachment) {
    let icon = match attachment.status {
        dom_chat::AttachmentStatus::Uploaded => "✅",
        dom_chat::AttachmentStatus::Failed => "❌",
        _ => "⏳",
    };
    println!(
        "   {} {} ({}) - {} [{}]",
        icon,
        attachment.file_name,
        format_file_size(attachment.file_size),
        attachment.status.label(),
        attachment.id
    );
    if let Some(error) = &attachment.error {
        println!("      {}", error.message);
    }
}

pub fn print_ic5(record: &Ic5Record) {
    println!();
    println!("📋 IC-5");
    if !record.decision.is_empty() {
        println!("   Decision: {}", record.decision);
    }
    if !record.why.is_empty() {
        println!("   Why:      {}", record.why);
    }
    for (i, action) in record.next_actions.iter().enumerate() {
        println!("   {}. {}", i + 1, action);
    }
    for warning in &record.parse_warnings {
        println!("   ⚠️  {}", warning);
    }
}
