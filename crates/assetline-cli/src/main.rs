#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use assetline_core::Config;
use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "assetline")]
#[command(author, version, about = "Front-end asset pipeline with a live-reloading dev server", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the project root
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build everything, then watch and serve with live reload (default)
    Dev(DevArgs),

    /// Build every category once and exit
    Build,

    /// Re-run categories as their sources change, without serving
    Watch,

    /// Print version information
    Version,
}

#[derive(clap::Args, Debug, Default)]
struct DevArgs {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Expose the server through a public tunnel
    #[arg(long)]
    tunnel: bool,

    /// Open a browser once the server is up
    #[arg(long)]
    open: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    let command = cli.command.unwrap_or(Commands::Dev(DevArgs::default()));
    if matches!(command, Commands::Version) {
        return commands::version::run();
    }

    logging::init(config.verbosity, config.json_logs);

    match command {
        Commands::Dev(args) => commands::dev::run(
            &config,
            commands::dev::DevAction {
                port: args.port,
                host: args.host,
                tunnel: args.tunnel,
                open: args.open,
            },
        ),
        Commands::Build => commands::build::run(&config),
        Commands::Watch => commands::watch::run(&config),
        Commands::Version => commands::version::run(),
    }
}
