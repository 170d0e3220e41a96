mod commands;

use berth_core::install_signal_handler;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "berth",
    version,
    about = "Run a command inside a throwaway, readiness-checked container"
)]
struct Cli {
    /// Option file (TOML, or JSON with a .json extension).
    #[arg(long, short = 'c', default_value = "berth.toml", global = true)]
    config: PathBuf,

    /// Container provider to use.
    #[arg(long, default_value = "docker", global = true)]
    provider: String,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the container, wait until it is ready, run a command, then release it.
    Run {
        /// Program and arguments to run (after --).
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },
    /// Validate the option file and print the resolved configuration.
    Validate {
        /// Output the resolved configuration as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check that the provider and option file are usable.
    Doctor {
        /// Output results as structured JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BERTH_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let result = match cli.command {
        Commands::Run { command } => commands::run::run(&cli.config, &cli.provider, &command),
        Commands::Validate { json } => commands::validate::run(&cli.config, json),
        Commands::Doctor { json } => commands::doctor::run(&cli.config, &cli.provider, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::CONFIG_ERROR_PREFIX) {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
