//! Validated run configuration
//!
//! The target specifier is read once at start-up, from `--target` or the
//! `COUNT_CALLS_TO` environment variable. Any problem with it is fatal
//! before instrumentation starts.

use std::path::PathBuf;

use thiserror::Error;

use crate::cli::{Cli, OutputFormat};
use crate::specifier::{SpecifierError, TargetSpec};

/// Environment variable holding the target specifier
pub const TARGET_ENV: &str = "COUNT_CALLS_TO";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no target given: pass --target OWNER#MEMBER or set {}", TARGET_ENV)]
    MissingTarget,

    #[error(transparent)]
    Specifier(#[from] SpecifierError),
}

/// Settings for one run of the binary
#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub target: TargetSpec,
    pub format: OutputFormat,
    pub debug: bool,
    pub script: PathBuf,
}

impl CounterConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Ok(Self {
            target: parse_target(cli.target.as_deref())?,
            format: cli.format,
            debug: cli.debug,
            script: cli.script.clone(),
        })
    }

    /// Read the target specifier from `COUNT_CALLS_TO`
    pub fn target_from_env() -> Result<TargetSpec, ConfigError> {
        let raw = std::env::var(TARGET_ENV).ok();
        parse_target(raw.as_deref())
    }
}

fn parse_target(raw: Option<&str>) -> Result<TargetSpec, ConfigError> {
    let raw = raw.ok_or(ConfigError::MissingTarget)?;
    Ok(TargetSpec::parse(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_with_target() {
        let cli = Cli::parse_from(["callcount", "-t", "Counter#increment", "p.cc"]);
        let config = CounterConfig::from_cli(&cli).unwrap();
        assert_eq!(config.target.raw(), "Counter#increment");
        assert_eq!(config.script, PathBuf::from("p.cc"));
    }

    #[test]
    fn test_missing_target() {
        assert_eq!(parse_target(None).unwrap_err(), ConfigError::MissingTarget);
        assert!(ConfigError::MissingTarget
            .to_string()
            .contains("COUNT_CALLS_TO"));
    }

    #[test]
    fn test_malformed_target() {
        let err = parse_target(Some("not a spec")).unwrap_err();
        assert!(matches!(err, ConfigError::Specifier(_)));
        assert!(matches!(
            parse_target(Some("")),
            Err(ConfigError::Specifier(_))
        ));
    }
}
