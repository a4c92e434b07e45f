//! Command-line interface definitions using clap.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Parse and index game script files through a crash-isolated worker pool.
#[derive(Parser, Debug)]
#[command(name = "modidx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root of the script corpus.
    #[arg(long, env = "MODIDX_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a single script file or stdin.
    Parse(ParseArgs),

    /// Walk a directory tree and parse every script file in it.
    Scan(ScanArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),

    /// Run as a parse worker on stdin/stdout (spawned by the pool).
    #[command(name = "internal-worker", hide = true)]
    InternalWorker,
}

/// Arguments for the parse command.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Script file to parse.
    #[arg(required_unless_present = "stdin")]
    pub file: Option<PathBuf>,

    /// Read script text from stdin instead of a file.
    #[arg(long, conflicts_with = "file")]
    pub stdin: bool,

    /// Display filename for stdin input.
    #[arg(long, default_value = "<stdin>", requires = "stdin")]
    pub filename: String,

    /// Per-parse timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,

    /// Print the AST as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the scan command.
#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Directory to scan (defaults to the corpus root).
    pub dir: Option<PathBuf>,

    /// Extensions (without dot) that count as script files.
    #[arg(short = 'e', long, value_delimiter = ',', default_value = "txt")]
    pub extension: Vec<String>,

    /// Number of parallel parse requests.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-parse timeout in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub timeout_ms: u64,
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "modidx",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        // Verify the CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_command() {
        let args = Cli::try_parse_from(["modidx", "parse", "common/cultures.txt"]).unwrap();
        match args.command {
            Commands::Parse(parse) => {
                assert_eq!(parse.file, Some(PathBuf::from("common/cultures.txt")));
                assert!(!parse.stdin);
                assert_eq!(parse.timeout_ms, 30_000);
            }
            _ => panic!("Expected Parse command"),
        }
    }

    #[test]
    fn test_parse_requires_file_or_stdin() {
        assert!(Cli::try_parse_from(["modidx", "parse"]).is_err());
        assert!(Cli::try_parse_from(["modidx", "parse", "--stdin"]).is_ok());
        assert!(Cli::try_parse_from(["modidx", "parse", "a.txt", "--stdin"]).is_err());
    }

    #[test]
    fn test_scan_command_defaults() {
        let args = Cli::try_parse_from(["modidx", "scan"]).unwrap();
        match args.command {
            Commands::Scan(scan) => {
                assert!(scan.dir.is_none());
                assert_eq!(scan.extension, vec!["txt"]);
                assert!(scan.jobs.is_none());
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_scan_extension_list() {
        let args = Cli::try_parse_from(["modidx", "scan", ".", "-e", "txt,gui"]).unwrap();
        match args.command {
            Commands::Scan(scan) => {
                assert_eq!(scan.extension, vec!["txt", "gui"]);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_internal_worker_hidden_but_parseable() {
        let args = Cli::try_parse_from(["modidx", "internal-worker"]).unwrap();
        assert!(matches!(args.command, Commands::InternalWorker));
    }

    #[test]
    fn test_global_options() {
        let args = Cli::try_parse_from(["modidx", "-vv", "--no-color", "scan"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(args.no_color);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["modidx", "-v", "-q", "scan"]);
        assert!(result.is_err());
    }
}
