//! Tallybot - conversational counter tracker
//!
//! Main entry point: initializes tracing, parses the CLI, loads
//! configuration, and dispatches to the interactive bot loop or the record
//! administration commands.

use anyhow::Result;
use prettytable::{cell, row, Table};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tallybot::cli::{Cli, Commands, CounterCommand};
use tallybot::config::Config;
use tallybot::flows::Bot;
use tallybot::store::{CounterStore, FileStore};
use tallybot::transport::{ChatId, ConsoleTransport, Trigger};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    let store = match &config.storage.data_dir {
        Some(dir) => FileStore::new_with_path(dir)?,
        None => FileStore::new()?,
    };

    match cli.command {
        Commands::Run { chat } => {
            let chat = ChatId(chat.unwrap_or(config.console.chat_id));
            tracing::info!(%chat, "starting interactive console bot");
            run_console(Arc::new(store), chat).await
        }
        Commands::Counters { command } => match command {
            CounterCommand::List { chat, json } => list_counters(&store, ChatId(chat), json),
            CounterCommand::Remove { chat, name } => {
                store.remove_counter(ChatId(chat), &name)?;
                println!("Removed {}.", name);
                Ok(())
            }
        },
    }
}

/// Interactive console loop
///
/// Every line is resolved into a command trigger and dispatched; a chained
/// question flow runs to completion (reading its answers from the same
/// terminal) before the loop reads the next command.
async fn run_console(store: Arc<FileStore>, chat: ChatId) -> Result<()> {
    let console = Arc::new(ConsoleTransport::new()?);
    let bot = Bot::new(console.clone(), store);

    println!("Tallybot. Type menu for an overview, exit to quit.");

    loop {
        let line = match console.read_line("tallybot> ").await {
            Ok(line) => line,
            // Ctrl-C / Ctrl-D
            Err(_) => break,
        };
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let line = line.strip_prefix('/').unwrap_or(&line);
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name.to_string(), Some(arg.trim().to_string())),
            None => (line.to_string(), None),
        };

        let trigger = Trigger::Command { chat, name, arg };
        if let Err(e) = bot.dispatch(trigger).await {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
        }
    }

    println!("Bye.");
    Ok(())
}

/// Print a chat's counters as a table or JSON
fn list_counters(store: &FileStore, chat: ChatId, json: bool) -> Result<()> {
    let counters = store.load_counters(chat)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counters)?);
        return Ok(());
    }

    if counters.is_empty() {
        println!("No counters for chat {}.", chat);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["NAME", "KIND", "STEP", "VALUE", "LAST ACCRUAL"]);
    for counter in &counters {
        table.add_row(row![
            counter.name,
            counter.kind.as_token(),
            counter.step,
            counter.value,
            counter.last_accrual
        ]);
    }
    table.printstd();
    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tallybot=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
