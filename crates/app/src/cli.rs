use std::path::PathBuf;

use clap::{Parser, Subcommand};
use postwhale_domain::ViewMode;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "postwhale")]
#[command(about = "Talk to the PostWhale worker over its line protocol")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Worker executable, overriding the settings
    #[arg(long, global = true)]
    pub worker: Option<PathBuf>,

    /// Per-call deadline in milliseconds, overriding the settings
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one action and print the result
    Invoke {
        /// Action name, e.g. `getRepositories`
        action: String,
        /// JSON payload (defaults to `{}`)
        data: Option<String>,
    },
    /// Print the explorer tree after filtering
    Tree {
        /// View mode: all, favorites or filters
        #[arg(long, default_value_t = ViewMode::All)]
        mode: ViewMode,
        /// Search text matched against names, paths and methods
        #[arg(long, short = 's', default_value = "")]
        search: String,
        /// HTTP method kept in filters mode (repeatable)
        #[arg(long = "method", short = 'm')]
        methods: Vec<String>,
    },
    /// Read `<action> [json]` lines from stdin and send them concurrently
    Repl,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tree_accepts_repeated_methods() {
        let cli = Cli::parse_from([
            "postwhale", "tree", "--mode", "filters", "-m", "GET", "-m", "post",
        ]);

        match cli.command {
            Command::Tree { mode, methods, .. } => {
                assert_eq!(mode, ViewMode::Filters);
                assert_eq!(methods, vec!["GET".to_string(), "post".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["postwhale", "invoke", "getRepositories", "--timeout-ms", "500"]);

        assert_eq!(cli.timeout_ms, Some(500));
        assert!(matches!(cli.command, Command::Invoke { data: None, .. }));
    }
}
