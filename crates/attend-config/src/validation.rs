//! Configuration validation

use crate::schema::{RawConfig, RawStoreConfig};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field}: {message}")]
    FieldError {
        section: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Target code {0} does not fit in 16 bits")]
    TargetCodeOutOfRange(u32),
}

fn field_error(section: &'static str, field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError::FieldError {
        section,
        field,
        message: message.into(),
    }
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.agent.retry_delay_seconds == Some(0) {
        errors.push(field_error("agent", "retry_delay_seconds", "must be greater than 0"));
    }
    if let Some(markers) = &config.agent.exemption_markers
        && markers.iter().any(|m| m.trim().is_empty())
    {
        errors.push(field_error("agent", "exemption_markers", "marker names cannot be empty"));
    }

    let inference = &config.inference;
    if let Some(hour) = inference.late_hour
        && hour >= 24
    {
        errors.push(field_error("inference", "late_hour", "must be 0-23"));
    }
    if let Some(codes) = &inference.target_codes {
        if codes.is_empty() {
            errors.push(field_error("inference", "target_codes", "cannot be empty"));
        }
        for code in codes {
            if *code > u16::MAX as u32 {
                errors.push(ValidationError::TargetCodeOutOfRange(*code));
            }
        }
    }
    if let Some(start) = &inference.correction_window_start {
        errors.extend(check_time(start));
    }
    if inference.max_lookback_days == Some(0) {
        errors.push(field_error("inference", "max_lookback_days", "must be at least 1"));
    }

    let shutdown = &config.shutdown;
    if let Some(cutoff) = &shutdown.cutoff {
        errors.extend(check_time(cutoff));
    }
    if let Some(cpu) = shutdown.cpu_threshold_percent
        && !(0.0..=100.0).contains(&cpu)
    {
        errors.push(field_error("shutdown", "cpu_threshold_percent", "must be within 0-100"));
    }
    if shutdown.countdown_seconds == Some(0) {
        errors.push(field_error("shutdown", "countdown_seconds", "must be greater than 0"));
    }
    if shutdown.tick_seconds == Some(0) {
        errors.push(field_error("shutdown", "tick_seconds", "must be greater than 0"));
    }

    let host = &config.host;
    if let Some(cmd) = &host.idle_command
        && cmd.first().is_none_or(|program| program.is_empty())
    {
        errors.push(field_error("host", "idle_command", "program cannot be empty"));
    }
    if host.command_timeout_seconds == Some(0) {
        errors.push(field_error("host", "command_timeout_seconds", "must be greater than 0"));
    }
    for (program, command) in &host.command_overrides {
        if command.first().is_none_or(|exe| exe.is_empty()) {
            errors.push(field_error(
                "host",
                "command_overrides",
                format!("override for '{}' has no program", program),
            ));
        }
    }
    for code in host.journal_codes.values() {
        if *code == 0 {
            errors.push(field_error("host", "journal_codes", "raw codes must be non-zero"));
        }
    }

    if let RawStoreConfig::Rest {
        url,
        api_key,
        roster_table,
        attendance_table,
        ..
    } = &config.store
    {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(field_error("store", "url", format!("'{}' is not an http(s) URL", url)));
        }
        if api_key.is_empty() {
            errors.push(field_error("store", "api_key", "cannot be empty"));
        }
        for table in [roster_table, attendance_table].into_iter().flatten() {
            if !is_identifier(table) {
                errors.push(field_error(
                    "store",
                    "table",
                    format!("'{}' is not a valid table name", table),
                ));
            }
        }
    }

    errors
}

fn check_time(value: &str) -> Option<ValidationError> {
    parse_time(value)
        .err()
        .map(|message| ValidationError::InvalidTimeFormat {
            value: value.to_string(),
            message,
        })
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("18:30").unwrap(), (18, 30));
        assert_eq!(parse_time("00:00").unwrap(), (0, 0));
        assert_eq!(parse_time("23:59").unwrap(), (23, 59));

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("18:30:00").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw("config_version = 1")).is_empty());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = raw(
            r#"
            config_version = 1

            [inference]
            late_hour = 24
            target_codes = [42, 70000]

            [shutdown]
            cutoff = "25:00"
            cpu_threshold_percent = 120.0
            tick_seconds = 0
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::TargetCodeOutOfRange(70000))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidTimeFormat { .. })));
    }

    #[test]
    fn rejects_empty_target_codes() {
        let config = raw(
            r#"
            config_version = 1

            [inference]
            target_codes = []
            "#,
        );

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.to_string().contains("target_codes")));
    }

    #[test]
    fn rejects_bad_rest_store() {
        let config = raw(
            r#"
            config_version = 1

            [store]
            type = "rest"
            url = "ftp://example.com"
            api_key = ""
            roster_table = "user list"
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3, "{:?}", errors);
    }

    #[test]
    fn rejects_empty_idle_command() {
        let config = raw(
            r#"
            config_version = 1

            [host]
            idle_command = []
            "#,
        );

        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn rejects_empty_command_override() {
        let config = raw(
            r#"
            config_version = 1

            [host.command_overrides]
            shutdown = ["sudo", "-n", "shutdown"]
            zenity = []
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].to_string().contains("zenity"));
    }
}
