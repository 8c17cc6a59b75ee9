//! ticketchain - key bootstrap and node runner for the ticket services.

use std::env;
use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ticketchain::config::Settings;
use ticketchain::node::{bootstrap_keys, Node};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_CONFIG_PATH: &str = "/etc/ticketchain/ticketchain.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Keygen,
    Check,
    Serve,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let command = match get_command(&args) {
        Ok(c) => c,
        Err(unknown) => {
            eprintln!("Unknown command '{}'. Run with --help for usage.", unknown);
            return ExitCode::FAILURE;
        }
    };

    let config_path = get_config_path(&args);
    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);
    info!("Key directory: {}", settings.keys.dir.display());

    match command {
        Command::Keygen => match bootstrap_keys(&settings) {
            Ok(report) => {
                for (role, created) in &report.roles {
                    let state = if *created { "generated" } else { "present" };
                    println!("{:<4} {}", role, state);
                }
                let state = if report.secret_created { "generated" } else { "present" };
                println!("secret {} ({})", state, report.secret_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Key bootstrap failed");
                ExitCode::FAILURE
            }
        },
        Command::Check => match Node::from_settings(&settings) {
            Ok(node) => {
                println!("configuration ok, serving '{}'", node.isv.service_id());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Node check failed");
                ExitCode::FAILURE
            }
        },
        Command::Serve => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to create Tokio runtime");
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(serve(settings)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "Node failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Run the node until a shutdown signal arrives.
async fn serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let node = Node::from_settings(&settings)?;
    let maintenance = node.start_maintenance();
    info!(
        service = %node.isv.service_id(),
        cleanup_interval_secs = settings.rate_limit.cleanup_interval_seconds,
        "Node ready"
    );

    shutdown_signal().await;
    info!("Shutdown signal received, stopping maintenance tasks...");
    maintenance.shutdown().await;

    let summary = node.rate_limiter.summary();
    if summary.banned_identities > 0 {
        warn!(banned = summary.banned_identities, "Exiting with active bans");
    }

    info!("Node stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Deterministic ticket authentication services for IoT devices.

USAGE:
    {} [OPTIONS] [COMMAND]

COMMANDS:
    keygen                 Generate missing role keys and the derivation secret
    check                  Load keys and configuration, then exit
    serve                  Run the node until SIGINT/SIGTERM [default]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: {}]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME, DEFAULT_CONFIG_PATH
    );
}

/// Get the subcommand, skipping option values.
fn get_command(args: &[String]) -> Result<Command, String> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            iter.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return match arg.as_str() {
            "keygen" => Ok(Command::Keygen),
            "check" => Ok(Command::Check),
            "serve" => Ok(Command::Serve),
            other => Err(other.to_string()),
        };
    }
    Ok(Command::Serve)
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Initialize logging based on settings.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}
