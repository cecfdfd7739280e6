//! REPL options
//!
//! Every field is optional so layers can be merged: caller-supplied
//! options win over backend defaults, which win over built-in defaults.

use std::path::{Path, PathBuf};

use crate::util::config::ReplConfig;

/// Options shared by the driver, the pipeline and the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplOptions {
    /// Compiled-output directory; enables directory-mode dependency loading
    pub output_dir: Option<PathBuf>,
    /// Attach inline source maps and remap traces
    pub source_map: Option<bool>,
    /// Print generated JavaScript and extra failure context
    pub verbose: Option<bool>,
    /// Colorize error output
    pub colors: Option<bool>,
}

impl ReplOptions {
    /// Fill every unset field from `defaults`
    pub fn merge_under(
        self,
        defaults: ReplOptions,
    ) -> ReplOptions {
        ReplOptions {
            output_dir: self.output_dir.or(defaults.output_dir),
            source_map: self.source_map.or(defaults.source_map),
            verbose: self.verbose.or(defaults.verbose),
            colors: self.colors.or(defaults.colors),
        }
    }

    /// Options from the `[repl]` table of the user config
    pub fn from_config(config: &ReplConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            source_map: config.source_map,
            verbose: config.verbose,
            colors: config.colors,
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn source_map(&self) -> bool {
        self.source_map.unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn colors(&self) -> bool {
        self.colors.unwrap_or(true)
    }
}
