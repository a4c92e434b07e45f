//! modidx - game script parse and index tool

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use modidx::cli::{Cli, Commands, ParseArgs, ScanArgs};
use modidx::logging::{self, LogConfig};
use modidx::pool::{ParseResult, ParseService};
use modidx::scan::{self, ScanOptions};
use std::time::Duration;

fn main() {
    let cli = Cli::parse();

    // Worker mode speaks the wire protocol on stdout; it must run before
    // any logging or color setup touches the streams.
    if matches!(cli.command, Commands::InternalWorker) {
        modidx::pool::worker_main::run_worker();
    }

    if cli.no_color {
        owo_colors::set_override(false);
    }

    logging::init(LogConfig::from_verbosity(cli.verbose, cli.quiet).with_env_overrides());

    let result = match &cli.command {
        Commands::Parse(args) => cmd_parse(&cli, args),
        Commands::Scan(args) => cmd_scan(&cli, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
        Commands::InternalWorker => unreachable!("handled above"),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        // Print the error chain if there are causes
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Build the parse service, honoring the --root override.
fn get_service(cli: &Cli) -> Result<ParseService> {
    ParseService::from_env(cli.root.as_deref()).context("failed to configure the parse service")
}

fn cmd_parse(cli: &Cli, args: &ParseArgs) -> Result<()> {
    let service = get_service(cli)?;
    let timeout = Duration::from_millis(args.timeout_ms);

    let result = if args.stdin {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
            .context("failed to read stdin")?;
        service.parse_text(&text, &args.filename, timeout)
    } else {
        let file = args.file.as_ref().expect("clap enforces file or --stdin");
        let path = file
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", file.display()))?;
        service.parse_file(&path, timeout)
    };

    service.shutdown_pool();

    match result {
        ParseResult::Success {
            ast_json,
            node_count,
        } => {
            if args.json {
                println!("{}", ast_json);
            } else if !cli.quiet {
                println!("ok: {} nodes", node_count);
            }
            Ok(())
        }
        ParseResult::Failure { kind, message } => {
            anyhow::bail!("{}: {}", kind, message)
        }
    }
}

fn cmd_scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let service = get_service(cli)?;

    let root = match &args.dir {
        Some(dir) => dir.clone(),
        None => cli
            .root
            .clone()
            .map(Ok)
            .unwrap_or_else(std::env::current_dir)?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", root.display()))?;

    let mut options = ScanOptions::new(root);
    options.extensions = args.extension.clone();
    if let Some(jobs) = args.jobs {
        options.jobs = jobs;
    }
    options.timeout = Duration::from_millis(args.timeout_ms);

    let summary = scan::scan(&service, &options);
    service.shutdown_pool();

    if !cli.quiet {
        eprintln!(
            "scanned {} files in {:.2}s: {} parsed, {} failed, {} nodes",
            summary.files,
            summary.elapsed.as_secs_f64(),
            summary.parsed,
            summary.failed,
            summary.nodes
        );
        for (path, reason) in &summary.failures {
            eprintln!("  {}: {}", path.display(), reason);
        }
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} files failed to parse", summary.failed, summary.files);
    }
    Ok(())
}
