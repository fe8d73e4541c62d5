//! Config validation CLI tool
//!
//! Validates an attendd configuration file and reports any errors.

use attend_config::StoreSettings;
use attend_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an attendd configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match attend_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", attend_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", config.agent.data_dir.display());

            let codes: Vec<String> = config
                .inference
                .target_codes
                .iter()
                .map(|c| c.to_string())
                .collect();
            println!(
                "  Late-shutdown correction: previous event at or after {:02}:00, codes [{}] from {}",
                config.inference.late_hour,
                codes.join(", "),
                config.inference.correction_window_start
            );

            if config.shutdown.enabled {
                println!(
                    "  Shutdown monitor: after {}, idle >= {}s and CPU <= {}%, countdown {}s{}",
                    config.shutdown.cutoff,
                    config.shutdown.idle_threshold.as_secs(),
                    config.shutdown.cpu_threshold_percent,
                    config.shutdown.countdown.as_secs(),
                    if config.shutdown.interactive { " (asks first)" } else { "" }
                );
            } else {
                println!("  Shutdown monitor: disabled");
            }

            match &config.store {
                StoreSettings::Sqlite { .. } => {
                    if let Some(path) = config.store.sqlite_path(&config.agent.data_dir) {
                        println!("  Store: sqlite ({})", path.display());
                    }
                }
                StoreSettings::Rest { url, attendance_table, .. } => {
                    println!("  Store: rest ({}, table {})", url, attendance_table);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                attend_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                attend_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                attend_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                attend_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        attend_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
