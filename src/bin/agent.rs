//! # AI Request Core — standalone CLI
//!
//! A thin command-line entry point over [`ai_request_core::RequestCore`],
//! useful for exercising the routing/filtering pipeline without a real
//! chat-platform adapter wired up. It is not the production deployment
//! surface — a chat bot embeds the library directly and supplies its own
//! `StorageCollaborator`/`ChatPlatformCollaborator` implementations.
//!
//! ## Usage
//!
//! ```bash
//! # Send a single message through the core and print the reply
//! ai-request-core --user u1 --channel c1 "what's the weather like?"
//!
//! # Debug logging
//! ai-request-core --log-level debug "hello"
//! ```

use ai_request_core::collaborators::{ChatEvent, InMemoryChatPlatform, InMemoryStorage};
use ai_request_core::{RequestCore, RequestCoreConfig};
use clap::Parser;
use std::sync::Arc;

/// Command line arguments for the standalone core CLI.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The message text to run through the core.
    message: String,

    /// User identifier the message is attributed to.
    #[arg(long, default_value = "cli-user")]
    user: String,

    /// Channel identifier the message is attributed to.
    #[arg(long, default_value = "cli-channel")]
    channel: String,

    /// Logging level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(&args.log_level).init();

    let storage = Arc::new(InMemoryStorage::new());
    let chat_platform = Arc::new(InMemoryChatPlatform::new());
    let core = RequestCore::from_env(storage, chat_platform, RequestCoreConfig::default())?;

    let event = ChatEvent {
        user_id: args.user,
        channel_id: args.channel,
        text: args.message,
        attachments: Vec::new(),
    };

    let reply = core.handle_message(&event).await?;
    println!("{reply}");

    Ok(())
}
