use std::str::FromStr;

use serde::Deserialize;

/// Output format of the log subscriber.
///
/// - `Json`: one JSON object per event (default, for log shipping).
/// - `Console`: human-readable, coloured output for local runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" => Ok(LogFormat::Console),
            other => Err(format!(
                "invalid log format: {other} (expected \"json\" or \"console\")"
            )),
        }
    }
}
