//! Formatting of received lines for stdout

use crate::core::protocol::ValveTelemetry;
use chrono::{DateTime, Local};

/// Output format for received lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Format one received line.
///
/// Telemetry lines get their parsed valve and angle attached in JSON mode.
pub fn format_line(
    line: &str,
    format: OutputFormat,
    timestamp: Option<DateTime<Local>>,
) -> String {
    match format {
        OutputFormat::Text => match timestamp {
            Some(ts) => format!("[{}] {line}", ts.format("%H:%M:%S%.3f")),
            None => line.to_string(),
        },
        OutputFormat::Json => {
            let mut value = serde_json::json!({ "line": line });
            if let Some(ts) = timestamp {
                value["timestamp"] = serde_json::Value::String(ts.to_rfc3339());
            }
            if let Some(telemetry) = ValveTelemetry::parse(line) {
                value["valve"] = telemetry.valve.into();
                value["angle"] = telemetry.angle.into();
            }
            value.to_string()
        }
    }
}
