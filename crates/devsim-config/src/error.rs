// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Errors that stop a configuration from loading at all.

use std::path::PathBuf;
use thiserror::Error;

/// Document-level configuration failure.
///
/// Problems with individual rules are not errors; they are reported as
/// [`crate::SkippedRule`] entries and the remaining rules still load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The document is not valid YAML or has the wrong top-level shape.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The document declares no rules.
    #[error("configuration declares no messages")]
    Empty,
}
