//! cljsrepl configuration system
//!
//! User-level configuration merged under command-line flags.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high -> low):
//! 1. CLI arguments
//! 2. User-level (~/.config/cljsrepl/config.toml)
//! 3. Backend defaults (EvalBackend::repl_options)
//! 4. Built-in defaults
//! ```
//!
//! # Example file
//!
//! ```toml
//! [repl]
//! colors = false
//! source_map = true
//!
//! [node]
//! port = 5002
//! lib_dir = "/opt/cljs/out"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// User-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UserConfig {
    /// REPL settings
    #[serde(default)]
    pub repl: ReplConfig,
    /// Node backend settings
    #[serde(default)]
    pub node: NodeConfig,
}

/// REPL configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ReplConfig {
    /// Colorize error output
    #[serde(default)]
    pub colors: Option<bool>,
    /// Print compiled JavaScript and verbose error context
    #[serde(default)]
    pub verbose: Option<bool>,
    /// Attach inline source maps to evaluated forms
    #[serde(default)]
    pub source_map: Option<bool>,
    /// Directory receiving compiled units
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Node backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NodeConfig {
    /// Host the runtime listens on
    #[serde(default)]
    pub host: Option<String>,
    /// Port the runtime listens on
    #[serde(default)]
    pub port: Option<u16>,
    /// Interpreter command or path
    #[serde(default)]
    pub command: Option<String>,
    /// Directory of precompiled JavaScript units
    #[serde(default)]
    pub lib_dir: Option<PathBuf>,
    /// Connection attempts before giving up
    #[serde(default)]
    pub connect_attempts: Option<u32>,
    /// Delay between connection attempts, in milliseconds
    #[serde(default)]
    pub connect_interval_ms: Option<u64>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("cljsrepl"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("cljsrepl"));
    }

    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("cljsrepl"));
    }

    None
}

/// Get the user config file path (~/.config/cljsrepl/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load user-level configuration
///
/// Returns the default config if no file exists.
pub fn load_user_config() -> Result<UserConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(UserConfig::default()),
    }
}

/// Load configuration from an explicit file
pub fn load_config_from(path: &Path) -> Result<UserConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config: UserConfig = toml::from_str("").unwrap();
        assert_eq!(config, UserConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config: UserConfig = toml::from_str(
            r#"
            [repl]
            colors = false

            [node]
            port = 5002
            "#,
        )
        .unwrap();

        assert_eq!(config.repl.colors, Some(false));
        assert_eq!(config.repl.source_map, None);
        assert_eq!(config.node.port, Some(5002));
        assert_eq!(config.node.host, None);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node]\nlib_dir = \"/opt/lib\"").unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.node.lib_dir, Some(PathBuf::from("/opt/lib")));
    }

    #[test]
    fn test_invalid_config_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[node\nport = ").unwrap();

        let err = load_config_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
