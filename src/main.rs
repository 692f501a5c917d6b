//! mail-bridge-mcp-rs: Local mailbox bridge MCP server over stdio
//!
//! Exposes the desktop mail client's personal and shared mailboxes to AI
//! assistants via the Model Context Protocol (MCP) over stdio: connection
//! diagnostics, exact-phrase search grouped into conversations, and
//! alert-history analysis. All access is read-only.
//!
//! # Architecture
//!
//! - `main`: Process entry point with CLI parsing and stdio serving
//! - `config`: Properties-file configuration with defaults
//! - `errors`: Application error model with MCP error mapping
//! - `store`: Mail store trait boundary, adapter, and in-memory backend
//! - `search`: Progressive strategy cascade per mailbox folder
//! - `cache`: TTL- and LRU-bounded search result cache
//! - `chain`: Conversation grouping, formatting, and alert statistics
//! - `mailbox`: Service layer fanning searches out per mailbox
//! - `server`: MCP tool handlers with validation
//! - `models`: Domain records and schema-bearing DTOs

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

use mail_bridge_mcp_rs::config::BridgeConfig;
use mail_bridge_mcp_rs::mailbox::MailboxService;
use mail_bridge_mcp_rs::server::MailBridgeServer;
use mail_bridge_mcp_rs::store::memory::MemoryStore;

/// Local mailbox bridge MCP server
#[derive(Debug, Parser)]
#[command(name = "mail-bridge-mcp-rs", version, about)]
struct Cli {
    /// Path to a config.properties file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve a seeded in-memory mailbox instead of a desktop mail client
    #[arg(long)]
    demo: bool,
}

/// Application entry point
///
/// Initializes tracing to stderr (stdout carries the MCP stream), loads
/// configuration, runs a startup access check, and serves over stdio. This
/// process expects to be spawned by an MCP client.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = BridgeConfig::load(cli.config)?;

    if !cli.demo {
        // desktop backends implement the store traits out of tree
        tracing::error!("no desktop mail backend is built into this binary; run with --demo");
        std::process::exit(1);
    }
    if !config.shared_configured() {
        // make the seeded shared mailbox reachable out of the box
        config.shared_mailbox_email = "escalations@example.com".to_owned();
    }
    let config = Arc::new(config);
    let store = Arc::new(MemoryStore::demo());
    let service = Arc::new(MailboxService::new(store, config));

    // startup diagnostics; an unreachable store is fatal
    match service.check_access().await {
        Ok(access) => {
            tracing::info!(
                status = %access.status,
                personal = access.personal_mailbox.accessible,
                shared_configured = access.shared_mailbox.configured,
                "mailbox access check complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "mail store unreachable at startup");
            std::process::exit(1);
        }
    }

    let running = MailBridgeServer::new(service).serve(stdio()).await?;
    running.waiting().await?;
    Ok(())
}
