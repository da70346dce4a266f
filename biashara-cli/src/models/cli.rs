use clap::{ArgAction, Parser, Subcommand};
use uuid::Uuid;

/// Biashara: a business advisor for young entrepreneurs in Kenya.
/// Starts an interactive session by default, or answers a single question.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Ask a single question non-interactively and print the answer.
    #[arg(short, long)]
    pub turn: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List saved conversations, newest first.
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the messages of a saved conversation.
    View {
        id: Uuid,
        /// Print every message in full instead of a one-line preview.
        #[arg(long)]
        full: bool,
    },
    /// Delete a saved conversation (asks for confirmation).
    Delete { id: Uuid },
    /// Continue a saved conversation.
    Resume {
        id: Uuid,
        /// Ask a single question in the resumed conversation and exit.
        #[arg(short, long)]
        turn: Option<String>,
    },
}
