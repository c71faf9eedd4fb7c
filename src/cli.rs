use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface for the status line and its spend reports.
#[derive(Debug, Parser)]
#[command(author, version, about = "Status line and spend ledger for Claude Code sessions", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file (defaults to <config dir>/claude-statusline/config.toml if present).
    #[arg(long, value_name = "FILE", global = true)]
    pub config_path: Option<PathBuf>,
    /// Disable ANSI colors (also respects NO_COLOR).
    #[arg(long, global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Read the session payload from stdin and print the two status lines.
    Statusline,
    /// Print today's recorded sessions and their total.
    Today,
    /// Print month-to-date spend grouped by day.
    Month,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Statusline)
    }
}
