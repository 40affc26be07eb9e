//! Listago CLI entry point.

use clap::Parser;
use listago::cli::commands::{self, Paths};
use listago::cli::{Cli, Commands};
use listago::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(run(&cli, json)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    if matches!(cli.command, Commands::Version) {
        return commands::version::execute(json);
    }
    let paths = Paths::resolve(cli)?;

    match &cli.command {
        Commands::Version => commands::version::execute(json),

        // Lists
        Commands::Lists(args) => commands::lists::execute_lists(args, &paths, json).await,
        Commands::Add(args) => commands::lists::execute_add(args, &paths, json).await,
        Commands::Trash { ids, all } => {
            commands::lists::execute_trash(ids, *all, &paths, json).await
        }
        Commands::Restore { ids, all } => {
            commands::lists::execute_restore(ids, *all, &paths, json).await
        }
        Commands::Delete { ids, all, active } => {
            commands::lists::execute_delete(ids, *all, *active, &paths, json).await
        }
        Commands::Items { command } => commands::lists::execute_items(command, &paths, json).await,

        // Maintenance
        Commands::Cleanup {
            older_than_days,
            max_count,
        } => {
            commands::maintenance::execute_cleanup(*older_than_days, *max_count, &paths, json)
                .await
        }
        Commands::Stats => commands::maintenance::execute_stats(&paths, json).await,
        Commands::Migrations => commands::maintenance::execute_migrations(&paths, json).await,

        // Transfer
        Commands::Export(args) => commands::transfer::execute_export(args, &paths, json).await,
        Commands::Import(args) => commands::transfer::execute_import(args, &paths, json).await,
    }
}
