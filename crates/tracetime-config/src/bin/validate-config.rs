//! Config validation CLI tool
//!
//! Validates a tracetimed service configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use tracetime_config::{ConfigError, ConnectionStore, CURRENT_CONFIG_VERSION};
use tracetime_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) if path == "-h" || path == "--help" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Some(path) => PathBuf::from(path),
        None => default_config_path(),
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        eprintln!();
        eprintln!("tracetimed runs with defaults when no config file exists.");
        return ExitCode::from(1);
    }

    match tracetime_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", config.socket_path.display());
            println!("  Data dir: {}", config.data_dir.display());
            println!(
                "  Checkpoint interval: {}s",
                config.checkpoint_interval.as_secs()
            );
            println!("  Tracker timeout: {}s", config.tracker_timeout.as_secs());

            let connection = ConnectionStore::new(config.connection_path());
            match connection.load() {
                Ok(Some(settings)) => {
                    println!();
                    println!("Connection ({}):", connection.path().display());
                    println!("  URL: {}", settings.url);
                    println!("  User: {} ({})", settings.username, settings.user_id);
                    println!("  Labels: {}", settings.effective_labels().join(", "));
                    println!("  Usable: {}", if settings.is_usable() { "yes" } else { "no" });
                }
                Ok(None) => {
                    println!();
                    println!("No connection settings saved yet");
                }
                Err(e) => {
                    println!();
                    println!("Connection settings unreadable: {}", e);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
                other => eprintln!("{}", other),
            }
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    let default_path = default_config_path();
    println!("Usage: validate-config [config-file]");
    println!();
    println!("Validates a tracetimed configuration file.");
    println!();
    println!("If no path is provided, uses: {}", default_path.display());
}
