// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for rule resolution and socket transport.

use thiserror::Error;

/// Configuration-class failure for a single rule.
///
/// Never fatal to a connection: the owning rule is disabled and its
/// siblings keep running.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The configured pattern is not a valid regular expression.
    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as written in the configuration.
        pattern: String,
        /// Underlying regex compile error.
        #[source]
        source: regex::Error,
    },
    /// The pattern matched zero candidate files.
    #[error("pattern '{pattern}' matches no files")]
    NoMatch {
        /// Pattern as written in the configuration.
        pattern: String,
    },
    /// The candidate directory could not be listed.
    #[error("failed to list candidate files: {0}")]
    Listing(#[source] std::io::Error),
    /// A matched file could not be read.
    #[error("failed to read '{file}': {source}")]
    Read {
        /// File name that failed to load.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Socket failure; fatal to the current connection only.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading from the client failed.
    #[error("socket read failed: {0}")]
    Read(#[source] std::io::Error),
    /// Writing a file to the client failed.
    #[error("failed to write '{file}' to socket: {source}")]
    Write {
        /// File whose bytes were being written.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The outbound writer has shut down; no further sends are accepted.
    #[error("outbound writer closed")]
    WriterClosed,
}
