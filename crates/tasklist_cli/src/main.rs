//! Command-line front end for the task list core.
//!
//! # Responsibility
//! - Load a session from config, hydrate it, apply one command, print the list.
//! - Address tasks by their 1-based position in the printed list.
//!
//! # Invariants
//! - Every dispatched remote operation is settled before the process exits.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tasklist_core::{init_logging_from_config, TaskItem, TaskKey, TodoConfig, TodoService};
use tokio::runtime::Handle;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(version)]
#[command(about = "Task list mirrored to a configurable document collection")]
struct Cli {
    /// TOML config file; built-in defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the task list (default)
    List,
    /// Add a task
    Add {
        title: String,
        /// Tag label, repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Mark a task as done
    Done { index: usize },
    /// Mark a task as not done
    Undone { index: usize },
    /// Remove a task
    Remove { index: usize },
    /// Remove every completed task
    ClearCompleted,
    /// Check core linkage
    Ping,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let command = cli.command.unwrap_or(Commands::List);
    if let Commands::Ping = command {
        println!("tasklist_core ping={}", tasklist_core::ping());
        println!("tasklist_core version={}", tasklist_core::core_version());
        return Ok(());
    }

    let config = match cli.config.as_ref() {
        Some(path) => TodoConfig::load(path).map_err(|err| err.to_string())?,
        None => TodoConfig::default(),
    };
    init_logging_from_config(&config.logging).map_err(|err| err.to_string())?;

    let mut service =
        TodoService::from_config(&config, Handle::current()).map_err(|err| err.to_string())?;
    service.hydrate().await.map_err(|err| err.to_string())?;

    let outcome = apply(&mut service, command);
    service.settle().await;

    for failure in service.take_failures() {
        eprintln!(
            "warning: remote {:?} failed: {}",
            failure.operation, failure.error
        );
    }
    outcome?;

    print_list(service.items());
    Ok(())
}

fn apply(service: &mut TodoService, command: Commands) -> Result<(), String> {
    match command {
        Commands::List | Commands::Ping => Ok(()),
        Commands::Add { title, tags } => match service.add(&title, tags) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                eprintln!("note: blank title ignored");
                Ok(())
            }
            Err(err) => Err(err.to_string()),
        },
        Commands::Done { index } => {
            let key = resolve_index(service.items(), index)?;
            service
                .toggle_done(key, true)
                .map(|_| ())
                .map_err(|err| err.to_string())
        }
        Commands::Undone { index } => {
            let key = resolve_index(service.items(), index)?;
            service
                .toggle_done(key, false)
                .map(|_| ())
                .map_err(|err| err.to_string())
        }
        Commands::Remove { index } => {
            let key = resolve_index(service.items(), index)?;
            service
                .remove(key)
                .map(|_| ())
                .map_err(|err| err.to_string())
        }
        Commands::ClearCompleted => {
            let removed = service.clear_completed();
            eprintln!("note: cleared {} completed task(s)", removed.len());
            Ok(())
        }
    }
}

fn resolve_index(items: &[TaskItem], index: usize) -> Result<TaskKey, String> {
    index
        .checked_sub(1)
        .and_then(|position| items.get(position))
        .map(|item| item.key)
        .ok_or_else(|| format!("no task at position {index} (list has {})", items.len()))
}

fn print_list(items: &[TaskItem]) {
    if items.is_empty() {
        println!("(no tasks)");
        return;
    }
    for (position, item) in items.iter().enumerate() {
        println!("{}", render_line(position + 1, item));
    }
}

fn render_line(number: usize, item: &TaskItem) -> String {
    let mark = if item.done { 'x' } else { ' ' };
    let mut line = format!("{number:>3}. [{mark}] {}", item.title);
    for tag in &item.tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    line
}
