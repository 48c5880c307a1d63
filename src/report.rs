//! Final report rendering (text and JSON)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

/// Final tally for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// The specifier as given by the user
    pub target: String,
    pub count: u64,
}

impl Report {
    pub fn new(target: impl Into<String>, count: u64) -> Self {
        Self {
            target: target.into(),
            count,
        }
    }

    /// Render in the requested output format
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.to_string(),
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_else(|e| {
                tracing::warn!("Failed to serialize report: {}", e);
                format!(r#"{{"target":{:?},"count":{}}}"#, self.target, self.count)
            }),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.count == 1 { "time" } else { "times" };
        write!(f, "{} called {} {}.", self.target, self.count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_pluralization() {
        assert_eq!(
            Report::new("Counter#increment", 5).to_string(),
            "Counter#increment called 5 times."
        );
        assert_eq!(
            Report::new("Counter#increment", 1).to_string(),
            "Counter#increment called 1 time."
        );
        assert_eq!(
            Report::new("Counter#increment", 0).to_string(),
            "Counter#increment called 0 times."
        );
    }

    #[test]
    fn test_render_text_matches_display() {
        let report = Report::new("A.b", 2);
        assert_eq!(report.render(OutputFormat::Text), report.to_string());
    }

    #[test]
    fn test_render_json() {
        let report = Report::new("A::B#c", 3);
        let json = report.render(OutputFormat::Json);
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert!(json.contains(r#""target":"A::B#c""#));
        assert!(json.contains(r#""count":3"#));
    }
}
