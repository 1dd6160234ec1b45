//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Display;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a report: its `Display` form as text, or pretty JSON.
pub fn print<T: Serialize + Display>(value: &T, format: &OutputFormat) {
    println!("{}", render(value, format));
}

fn render<T: Serialize + Display>(value: &T, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
    }
}

/// One-line status message; JSON mode emits `{"status", "message"}`.
#[derive(Serialize)]
struct Message<'a> {
    status: &'static str,
    message: &'a str,
}

impl Message<'_> {
    fn line(&self, format: &OutputFormat) -> String {
        match format {
            OutputFormat::Text if self.status == "error" => format!("Error: {}", self.message),
            OutputFormat::Text => self.message.to_string(),
            OutputFormat::Json => serde_json::json!(self).to_string(),
        }
    }
}

pub fn print_success(message: &str, format: &OutputFormat) {
    let message = Message {
        status: "success",
        message,
    };
    println!("{}", message.line(format));
}

/// Errors go to stderr so JSON on stdout stays parseable.
pub fn print_error(message: &str, format: &OutputFormat) {
    let message = Message {
        status: "error",
        message,
    };
    eprintln!("{}", message.line(format));
}
