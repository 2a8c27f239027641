//! `tether.toml`: defaults for lowering and running.
//!
//! ```toml
//! [lower]
//! strategy = "direct"
//! cleanup_failure = "aggregate"
//!
//! [run]
//! max_turns = 5000
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use std::path::Path;

use serde::Deserialize;
use tether_lower::LowerOptions;
use tether_rt::RunOptions;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub lower: LowerOptions,
    pub run: RunOptions,
}

impl Config {
    pub fn parse(content: &str) -> Result<Config, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn read(path: &Path) -> Result<Config, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config = Config::parse(&content)?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Read `path` if given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, String> {
        match path {
            Some(path) => Config::read(path),
            None => Ok(Config::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_lower::{CleanupFailurePolicy, SuspensionStrategyKind};

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
[lower]
strategy = "direct"
cleanup_failure = "aggregate"

[run]
max_turns = 12
"#,
        )
        .unwrap();
        assert_eq!(config.lower.strategy, SuspensionStrategyKind::Direct);
        assert_eq!(config.lower.cleanup_failure, CleanupFailurePolicy::Aggregate);
        assert_eq!(config.run.max_turns, 12);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::parse("[lower]\ncleanup_failure = \"aggregate\"\n").unwrap();
        assert_eq!(config.lower.strategy, SuspensionStrategyKind::StateMachine);
        assert_eq!(config.run, RunOptions::default());
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = Config::parse("[lower]\nstrategy = \"threads\"\n").unwrap_err();
        assert!(err.starts_with("Failed to parse config"), "{}", err);
        assert!(Config::parse("[linker]\n").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::read(&dir.path().join("tether.toml")).unwrap_err();
        assert!(err.starts_with("Failed to read"), "{}", err);
    }
}
