//! stickyconf CLI - keep configuration overrides merged into a file another
//! service owns.

use clap::Parser;
use std::io::IsTerminal;
use std::process;
use stickyconf::cli::{BackupsCommands, Cli, Commands, ConfigCommands};
use stickyconf::commands::{self, Output};
use stickyconf::config::{self, ConfigOverrides};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostics filter (`RUST_LOG` syntax).
const LOG_ENV: &str = "STICKYCONF_LOG";

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_tracing(cli.log_json);

    let overrides = ConfigOverrides {
        config: cli.config,
        target: cli.target,
        overrides: cli.overrides,
        service: cli.service,
    };

    if let Err(e) = run_command(cli.command, &overrides, human) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Diagnostics go to stderr so stdout stays reserved for command output.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_command(
    command: Commands,
    overrides: &ConfigOverrides,
    human: bool,
) -> Result<(), stickyconf::Error> {
    // `config init` runs before a valid config exists, so resolution is lazy.
    let resolve = || config::resolve_config(overrides);

    match command {
        Commands::Run => commands::run(&resolve()?)?,
        Commands::Once => {
            let result = commands::once(&resolve()?)?;
            output(&result, human);
        }
        Commands::Status => {
            let result = commands::status(&resolve()?)?;
            output(&result, human);
        }
        Commands::Backups { command } => {
            let resolved = resolve()?;
            match command {
                BackupsCommands::List => {
                    let result = commands::backups_list(&resolved)?;
                    output(&result, human);
                }
                BackupsCommands::Prune => {
                    let result = commands::backups_prune(&resolved)?;
                    output(&result, human);
                }
                BackupsCommands::Purge => {
                    let result = commands::backups_purge(&resolved)?;
                    output(&result, human);
                }
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(&resolve()?);
                output(&result, human);
            }
            ConfigCommands::Init { force } => {
                let result = commands::config_init(overrides, force)?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
