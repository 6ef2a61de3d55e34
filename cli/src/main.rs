//! Todoscope CLI
//!
//! Command-line client for the Todoscope todo service. Every command runs as
//! an instrumented client action with its own spans, logs and metrics.
//!
//! # Usage
//!
//! ```bash
//! todoscope --help
//! todoscope health
//! todoscope add "Buy milk"
//! todoscope --telemetry toggle 1
//! ```

#![deny(unsafe_code)]

mod board;
mod client;

use anyhow::Result;
use board::TodoBoard;
use clap::{Parser, Subcommand};
use client::TodoClient;
use shared::config::TelemetryConfig;
use shared::models::Todo;
use shared::telemetry::{
    FanoutExporter, InMemorySpanExporter, LogSpanExporter, Telemetry, TracingSink,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Todoscope CLI - instrumented todo client
#[derive(Parser)]
#[command(name = "todoscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API server URL
    #[arg(
        short,
        long,
        env = "TODOSCOPE_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    /// Print the client metrics snapshot as JSON after the command
    #[arg(long)]
    telemetry: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API server health
    Health,
    /// List todos
    List,
    /// Add a todo
    Add {
        /// Todo text
        text: String,
    },
    /// Toggle the completion state of a todo
    Toggle {
        /// Todo id
        id: u64,
    },
    /// Delete a todo
    Delete {
        /// Todo id
        id: u64,
    },
    /// Print the server's Prometheus metrics
    Metrics,
}

fn print_todos(todos: &[Todo]) {
    if todos.is_empty() {
        println!("No todos yet. Add one to get started!");
        return;
    }
    for todo in todos {
        let mark = if todo.completed { "x" } else { " " };
        println!("[{mark}] {:>4}  {}", todo.id, todo.text);
    }
    let completed = todos.iter().filter(|t| t.completed).count();
    println!(
        "Total: {}  Completed: {completed}  Pending: {}",
        todos.len(),
        todos.len() - completed
    );
}

fn telemetry() -> Telemetry {
    let config = TelemetryConfig::new("todoscope-cli");
    let exporter = FanoutExporter::new()
        .with_exporter(Arc::new(InMemorySpanExporter::new(config.span_buffer_capacity)))
        .with_exporter(Arc::new(LogSpanExporter));
    Telemetry::new(&config, Arc::new(TracingSink), Arc::new(exporter))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let telemetry = telemetry();
    let client = TodoClient::new(&cli.api_url);

    match cli.command {
        Some(Commands::Health) => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Some(Commands::Metrics) => {
            print!("{}", client.metrics_text().await?);
        }
        Some(Commands::List) => {
            let mut board = TodoBoard::new(client, &telemetry)?;
            board.refresh().await?;
            print_todos(board.todos());
        }
        Some(Commands::Add { text }) => {
            let mut board = TodoBoard::new(client, &telemetry)?;
            let todo = board.add(&text).await?;
            println!("Added todo {}: {}", todo.id, todo.text);
        }
        Some(Commands::Toggle { id }) => {
            let mut board = TodoBoard::new(client, &telemetry)?;
            board.refresh().await?;
            let todo = board.toggle(id).await?;
            let state = if todo.completed { "completed" } else { "pending" };
            println!("Todo {} is now {state}", todo.id);
        }
        Some(Commands::Delete { id }) => {
            let mut board = TodoBoard::new(client, &telemetry)?;
            board.refresh().await?;
            board.delete(id).await?;
            println!("Deleted todo {id}");
        }
        None => {
            println!("Todoscope CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    if cli.telemetry {
        let snapshot = telemetry.metrics().snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    Ok(())
}
