//! Mnemo server launcher
//!
//! `run` serves the memory over stdio JSON-RPC with a role-scoped session;
//! `export-schema` dumps the tool JSON schemas. Start-up failures (lock,
//! integrity, permission) exit non-zero.

mod protocol;
mod server;
mod tools;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemo_core::{HashEmbedder, Memory, MemoryConfig, TrustBoundary};

use crate::protocol::StdioTransport;
use crate::server::{Role, RpcServer};

/// Mnemo - durable knowledge memory for agents
#[derive(Parser)]
#[command(name = "mnemo-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stdio JSON-RPC server for the mnemo knowledge memory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the memory over stdio
    Run {
        /// Storage root directory
        #[arg(long)]
        path: PathBuf,

        /// Server instance name
        #[arg(long, default_value = "mnemo")]
        name: String,

        /// Session role
        #[arg(long, value_enum, default_value_t = Role::Agent)]
        role: Role,
    },

    /// Print the tool JSON schemas and exit
    ExportSchema,
}

fn main() -> anyhow::Result<()> {
    // Stdout belongs to the protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { path, name, role } => run(path, name, role),
        Commands::ExportSchema => export_schema(),
    }
}

fn run(path: PathBuf, name: String, role: Role) -> anyhow::Result<()> {
    // Admin sessions are the human channel: agents lose direct decision
    // writes there.
    let trust_boundary = match role {
        Role::Admin => TrustBoundary::HumanOnly,
        _ => TrustBoundary::AgentWithIntent,
    };
    let config = MemoryConfig::new(&path).with_trust_boundary(trust_boundary);
    let memory = Memory::new(config, Box::new(HashEmbedder::default()))
        .with_context(|| format!("failed to open memory at {}", path.display()))?;

    let server = RpcServer::new(memory, name, role);
    StdioTransport::new().run(server)?;
    Ok(())
}

fn export_schema() -> anyhow::Result<()> {
    let schemas = tools::descriptions();
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
