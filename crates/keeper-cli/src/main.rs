mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::{EXIT_DRIVER_ERROR, EXIT_FAILURE, EXIT_SPEC_ERROR};
use keeper_core::{RunOptions, DEFAULT_TEARDOWN_TIMEOUT};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "keeper",
    version,
    about = "Keep one named container converged on its spec"
)]
struct Cli {
    /// Path to the JSON config file (default: ~/.config/keeper/config.json if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Container backend to use (docker, podman, nerdctl, mock).
    #[arg(long, env = "KEEPER_DRIVER", global = true)]
    driver: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pull the image named in a spec.
    Pull {
        /// Path to the container spec (JSON, or YAML with a .yaml/.yml suffix).
        spec: PathBuf,
    },
    /// Converge the container on its spec and supervise it until it exits.
    Run {
        /// Path to the container spec (JSON, or YAML with a .yaml/.yml suffix).
        spec: PathBuf,
        /// Keep the container when the run is interrupted.
        #[arg(long, default_value_t = false)]
        no_cleanup: bool,
        /// Pull the image before reconciling.
        #[arg(long, default_value_t = false)]
        pull: bool,
    },
    /// Show the managed container for a spec.
    Status {
        /// Path to the container spec.
        spec: PathBuf,
    },
    /// Stop the managed container for a spec, keeping its record.
    Stop {
        /// Path to the container spec.
        spec: PathBuf,
    },
    /// Remove the managed container for a spec.
    Rm {
        /// Path to the container spec.
        spec: PathBuf,
    },
    /// List available container backends.
    Drivers,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_env("KEEPER_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries container output during `run`.
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
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
    init_logging(&cli);

    let config_path = cli.config.as_deref();
    let driver = cli.driver.as_deref();
    let json = cli.json;

    let result = match &cli.command {
        Commands::Pull { spec } => commands::pull::run(config_path, driver, spec, json).await,
        Commands::Run {
            spec,
            no_cleanup,
            pull,
        } => {
            let options = RunOptions {
                cleanup: !no_cleanup,
                pull: *pull,
                teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            };
            commands::run::run(config_path, driver, spec, &options).await
        }
        Commands::Status { spec } => commands::status::run(config_path, driver, spec, json).await,
        Commands::Stop { spec } => commands::stop::run(config_path, driver, spec, json).await,
        Commands::Rm { spec } => commands::rm::run(config_path, driver, spec, json).await,
        Commands::Drivers => commands::drivers::run(config_path, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(*shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("spec error:") {
                EXIT_SPEC_ERROR
            } else if msg.starts_with("driver error:") {
                EXIT_DRIVER_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
