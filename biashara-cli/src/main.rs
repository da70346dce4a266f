// biashara-cli/src/main.rs
mod history;
mod models;
mod session;

use anyhow::{Context, Result, anyhow};
use biashara_core::{Agent, AgentConfig};
use clap::Parser;
use colored::*;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use time::macros::format_description;
use tracing::{Level, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::history::{ConversationHistory, HistoryStore};
use crate::models::cli::{Cli, Commands};
use crate::session::{APOLOGY, take_turn};

const CONFIG_FILENAME: &str = "Biashara.toml";
const LOG_FILE_NAME: &str = "biashara-app.log";
const APP_DIR: &str = "biashara";

fn init_logging(verbose: u8) -> Result<(WorkerGuard, PathBuf)> {
    let default_level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_timer(timer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(timer)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    info!(
        level = %default_level,
        log_file = %log_path.display(),
        "Logging initialized (RUST_LOG overrides -v)"
    );
    Ok((guard, log_path))
}

/// Walks up from the current directory to the first one holding `Biashara.toml`.
fn find_project_root() -> Result<PathBuf> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    current_dir
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILENAME).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            anyhow!(
                "Could not find '{}' in current directory or any parent directory.",
                CONFIG_FILENAME
            )
        })
}

fn load_cli_config(project_root: &Path) -> Result<AgentConfig> {
    let config_path = project_root.join(CONFIG_FILENAME);
    info!("Found configuration file at: {:?}", config_path);
    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read project config file: {:?}", config_path))?;
    AgentConfig::from_toml_str(&content).context("Failed to parse or validate configuration content")
}

fn print_welcome_message(history_id: Uuid) {
    println!("\n{}", "Biashara - Business Advisor".cyan().bold());
    println!("{}: {}", "Conversation ID".cyan(), history_id);
    println!(
        "{}\n{}",
        "Type 'exit', 'quit', 'q', Ctrl-D, or press Enter on an empty line to quit.".dimmed(),
        "Type 'new' to start a fresh conversation.".dimmed()
    );
    println!();
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]),
    );
    pb.set_message("Thinking...");
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn save_or_report(store: &HistoryStore, history: &ConversationHistory) {
    match store.save(history) {
        Ok(()) => info!(history_id = %history.id, "Saved conversation history"),
        Err(e) => {
            error!(history_id = %history.id, error = ?e, "Failed to save conversation history");
            eprintln!("{}", "Error: Failed to save conversation history.".red());
        }
    }
}

/// Runs one turn, prints the reply or the apology, and saves the thread.
/// Returns whether the turn succeeded.
async fn run_turn_and_report(
    agent: &Agent,
    store: &HistoryStore,
    history: &mut ConversationHistory,
    input: &str,
) -> Result<bool> {
    let pb = spinner()?;
    let result = take_turn(agent, history, input).await;
    pb.finish_and_clear();

    let succeeded = match result {
        Ok(reply) => {
            println!("\n{}\n", reply);
            true
        }
        Err(e) => {
            println!("\n{}", APOLOGY.yellow());
            eprintln!("{} {}", "Details:".dimmed(), e.to_string().dimmed());
            false
        }
    };
    save_or_report(store, history);
    Ok(succeeded)
}

async fn run_single_turn(
    prompt: String,
    mut history: ConversationHistory,
    agent: &Agent,
    store: &HistoryStore,
) -> Result<()> {
    info!(history_id = %history.id, "Running non-interactive turn");
    if run_turn_and_report(agent, store, &mut history, &prompt).await? {
        Ok(())
    } else {
        Err(anyhow!("Turn failed; conversation {} saved", history.id))
    }
}

async fn run_interactive(
    mut history: ConversationHistory,
    agent: &Agent,
    store: &HistoryStore,
) -> Result<()> {
    print_welcome_message(history.id);

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .edit_mode(rustyline::EditMode::Emacs)
        .build();
    let mut rl = DefaultEditor::with_config(rl_config)?;

    let line_history_path = dirs::cache_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or_else(|| anyhow!("Could not determine cache directory for line history"))?;
    fs::create_dir_all(&line_history_path).context("Failed to create line history directory")?;
    let line_history_path = line_history_path.join("cli_history.txt");
    if rl.load_history(&line_history_path).is_err() {
        debug!(path = %line_history_path.display(), "No previous line history");
    }

    let prompt = format!("{} ", ">".green().bold());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                match input.to_lowercase().as_str() {
                    "" | "exit" | "quit" | "q" => {
                        info!("Exit requested, leaving interactive mode");
                        break;
                    }
                    "new" => {
                        if !history.messages.is_empty() {
                            save_or_report(store, &history);
                        }
                        history = ConversationHistory::new(Vec::new());
                        println!("\n{}", "Starting a new conversation...".cyan());
                        print_welcome_message(history.id);
                        continue;
                    }
                    _ => {}
                }
                run_turn_and_report(agent, store, &mut history, input).await?;
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, leaving interactive mode");
                break;
            }
            Err(err) => {
                error!(error = ?err, "Readline error");
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&line_history_path) {
        warn!(path = %line_history_path.display(), error = %e, "Failed to save line history");
    }
    if !history.messages.is_empty() {
        save_or_report(store, &history);
        println!("\n{}\n", "Conversation saved. Exiting.".cyan());
    }
    Ok(())
}

fn handle_list_conversations(store: &HistoryStore, limit: usize) -> Result<()> {
    let histories = store.list()?;
    if histories.is_empty() {
        println!("No saved conversations.");
        return Ok(());
    }

    println!("\n{}", "Recent Conversations:".bold());
    println!(
        "{:<36} {:<20} {}",
        "ID".underline(),
        "Last Updated".underline(),
        "Preview".underline()
    );
    for history in histories.iter().take(limit) {
        let local_time = history.last_updated_at.with_timezone(&chrono::Local);
        println!(
            "{:<36} {:<20} {}",
            history.id.to_string(),
            local_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            history.preview().dimmed()
        );
    }
    println!("\n{}", "(Use 'biashara view <ID>' to see details)".dimmed());
    Ok(())
}

fn handle_view_conversation(store: &HistoryStore, id: Uuid, full: bool) -> Result<()> {
    const VIEW_PREVIEW_CHARS: usize = 100;

    let history = store.load(id)?;
    let created = history.created_at.with_timezone(&chrono::Local);
    let updated = history.last_updated_at.with_timezone(&chrono::Local);

    println!("\n{}", format!("Conversation ID: {}", history.id).bold());
    println!("Created:         {}", created.format("%Y-%m-%d %H:%M:%S %Z"));
    println!("Last Updated:    {}", updated.format("%Y-%m-%d %H:%M:%S %Z"));
    println!("Messages:        {}", history.messages.len());
    println!("{}", "--- Messages ---".bold());

    let mut truncated = false;
    for message in &history.messages {
        println!("\n[{}]", message.role.to_string().to_uppercase().cyan());
        let content = message.content.as_deref().unwrap_or("");
        if full {
            println!("{}", content);
        } else {
            truncated |= content.lines().count() > 1 || content.chars().count() > VIEW_PREVIEW_CHARS;
            println!("{}", biashara_core::utils::preview(content, VIEW_PREVIEW_CHARS));
        }
    }
    println!("\n{}", "--- End ---".bold());
    if truncated {
        println!("{}", "(Pass --full to see complete message content)".dimmed());
    }
    Ok(())
}

fn handle_delete_conversation(store: &HistoryStore, id: Uuid) -> Result<()> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Delete conversation {}?", id))
        .default(false)
        .interact()?;
    if confirmed {
        store.delete(id)?;
        println!("Conversation {} deleted.", id);
    } else {
        println!("Deletion cancelled.");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let project_root = find_project_root()?;
    let store = HistoryStore::new(&project_root);

    // Subcommands that only touch saved threads need neither config nor agent.
    match &cli.command {
        Some(Commands::List { limit }) => return handle_list_conversations(&store, *limit),
        Some(Commands::View { id, full }) => return handle_view_conversation(&store, *id, *full),
        Some(Commands::Delete { id }) => return handle_delete_conversation(&store, *id),
        Some(Commands::Resume { .. }) | None => {}
    }

    let config = load_cli_config(&project_root)?;
    let agent = Agent::from_config(&config, &project_root).context("Failed to initialize agent")?;

    let (history, turn) = match cli.command {
        Some(Commands::Resume { id, turn }) => {
            let history = store
                .load(id)
                .with_context(|| format!("Could not load conversation history for ID: {}", id))?;
            info!(history_id = %history.id, "Resuming conversation");
            (history, turn)
        }
        _ => {
            let history = ConversationHistory::new(Vec::new());
            info!(history_id = %history.id, "Starting new conversation");
            (history, cli.turn)
        }
    };

    match turn {
        Some(prompt) => run_single_turn(prompt, history, &agent, &store).await,
        None => run_interactive(history, &agent, &store).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = match init_logging(cli.verbose) {
        Ok((guard, _log_path)) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Operation failed: {:#}", e);
            if e.downcast_ref::<dialoguer::Error>().is_none() {
                eprintln!("{} {:#}", "Error:".red(), e);
            }
            ExitCode::FAILURE
        }
    }
}
