use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::cli::OutputFormat;

/// Prints a result object. Text output renders top-level fields as
/// `key: value` lines.
pub fn print_value(value: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", format_text(value)),
    }
    Ok(())
}

/// Prints a single secret-bearing string (token, code, key) bare in text
/// mode so it can be captured with `$(...)`.
pub fn print_secret(field: &str, secret: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_value(&serde_json::json!({ field: secret }), format),
        OutputFormat::Text => {
            println!("{secret}");
            Ok(())
        }
    }
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn format_text(value: &Value) -> String {
    match value {
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| format!("{}: {}", key.cyan(), format_scalar(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => format_scalar(other),
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(format_scalar)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}
