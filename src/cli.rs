//! CLI argument parsing for callcount

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable one-line report (default)
    Text,
    /// JSON object for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "callcount")]
#[command(version)]
#[command(about = "Count calls to one method of a host program, even if it is defined late", long_about = None)]
pub struct Cli {
    /// Method to count, e.g. Counter#increment or Base64.encode64
    #[arg(short = 't', long = "target", value_name = "OWNER#MEMBER", env = "COUNT_CALLS_TO")]
    pub target: Option<String>,

    /// Output format for the final report
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output on stderr
    #[arg(long = "debug")]
    pub debug: bool,

    /// Host program script to run (`-` reads stdin)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_script() {
        let cli = Cli::parse_from(["callcount", "--target", "Counter#increment", "prog.cc"]);
        assert_eq!(cli.script, PathBuf::from("prog.cc"));
        assert_eq!(cli.target.as_deref(), Some("Counter#increment"));
    }

    #[test]
    fn test_cli_short_target_flag() {
        let cli = Cli::parse_from(["callcount", "-t", "A.b", "prog.cc"]);
        assert_eq!(cli.target.as_deref(), Some("A.b"));
    }

    #[test]
    fn test_cli_requires_script() {
        assert!(Cli::try_parse_from(["callcount", "--target", "A#b"]).is_err());
    }

    #[test]
    fn test_cli_format_default_text() {
        let cli = Cli::parse_from(["callcount", "-t", "A#b", "prog.cc"]);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["callcount", "-t", "A#b", "--format", "json", "prog.cc"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_debug_default_false() {
        let cli = Cli::parse_from(["callcount", "-t", "A#b", "prog.cc"]);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["callcount", "--format", "xml", "prog.cc"]).is_err());
    }
}
