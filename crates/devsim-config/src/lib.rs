// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rule configuration for the device simulator.
//!
//! Loads the YAML rule file in either the current flat format (`Messages`
//! with per-rule `waitCount`) or the deprecated reply-group format
//! (`WaitToStart` / `ReceiveCount` / `Replies`), validates each entry on
//! its own, and describes what a rule set will do ([`plan`]).

mod error;
mod legacy;
pub mod plan;
mod raw;

pub use error::ConfigError;
pub use plan::{plan, RulePlan};

use devsim_engine::{FilePattern, MessageRule};
use raw::{RawDocument, RawMessage};
use serde::Serialize;
use serde_yaml::Value;
use std::path::Path;
use tracing::{info, warn};

/// Which document layout a configuration used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    /// `Messages` list with per-rule `waitCount`.
    Flat,
    /// Deprecated `WaitToStart` / `ReceiveCount` / `Replies` layout.
    Legacy,
}

/// A rule entry that was left out, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    /// Position of the entry in the document (0-based, across reply groups).
    pub index: usize,
    /// What was wrong with it.
    pub reason: String,
}

/// A loaded rule set.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Valid rules, in document order.
    pub rules: Vec<MessageRule>,
    /// Layout the document used.
    pub format: ConfigFormat,
    /// Entries that failed validation.
    pub skipped: Vec<SkippedRule>,
}

/// Read and parse the configuration at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<DeviceConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&text)?;
    info!(
        path = %path.display(),
        rules = config.rules.len(),
        skipped = config.skipped.len(),
        format = ?config.format,
        "configuration loaded"
    );
    Ok(config)
}

/// Parse a configuration document.
pub fn parse(text: &str) -> Result<DeviceConfig, ConfigError> {
    if text.trim().is_empty() {
        return Err(ConfigError::Empty);
    }
    let doc: RawDocument = serde_yaml::from_str(text)?;

    let (format, entries) = if doc.is_legacy() {
        warn!(
            "legacy WaitToStart/ReceiveCount/Replies configuration is deprecated; \
             use a Messages list with per-rule waitCount"
        );
        let entries = legacy::flatten(doc)
            .into_iter()
            .map(|g| (g.entry, Some(g.wait_count)))
            .collect::<Vec<_>>();
        (ConfigFormat::Legacy, entries)
    } else {
        let entries = doc
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry, None))
            .collect::<Vec<_>>();
        (ConfigFormat::Flat, entries)
    };

    if entries.is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut rules = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for (index, (entry, wait_override)) in entries.into_iter().enumerate() {
        match decode_rule(entry, wait_override) {
            Ok(rule) => rules.push(rule),
            Err(reason) => {
                warn!(rule = index, %reason, "skipping rule");
                skipped.push(SkippedRule { index, reason });
            }
        }
    }

    Ok(DeviceConfig {
        rules,
        format,
        skipped,
    })
}

fn decode_rule(entry: Value, wait_override: Option<u64>) -> Result<MessageRule, String> {
    let raw: RawMessage = serde_yaml::from_value(entry).map_err(|err| err.to_string())?;
    FilePattern::compile(&raw.file_name).map_err(|err| err.to_string())?;
    Ok(MessageRule::new(
        raw.file_name,
        raw.delay,
        raw.repeat,
        wait_override.unwrap_or(raw.wait_count),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_format_applies_defaults() {
        let cfg = parse(
            r"
Messages:
  - file name: start\.1\.bin
  - file name: gps_data_.*
    delay: 100
    repeat: 0
    waitCount: 5
",
        )
        .unwrap();
        assert_eq!(cfg.format, ConfigFormat::Flat);
        assert!(cfg.skipped.is_empty());
        assert_eq!(
            cfg.rules,
            vec![
                MessageRule::new(r"start\.1\.bin", 0, 1, 0),
                MessageRule::new("gps_data_.*", 100, 0, 5),
            ]
        );
    }

    #[test]
    fn bad_entries_are_skipped_and_the_rest_load() {
        let cfg = parse(
            r"
Messages:
  - file name: good
    repeat: -1
  - file name: neg_delay
    delay: -5
  - delay: 10
  - file name: '(['
  - file name: count_as_text
    waitCount: lots
  - file name: also_good
    waitCount: 2
",
        )
        .unwrap();
        let patterns: Vec<_> = cfg.rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, ["good", "also_good"]);
        let skipped: Vec<_> = cfg.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, [1, 2, 3, 4]);
        assert!(cfg.skipped[1].reason.contains("file name"));
    }

    #[test]
    fn legacy_replies_become_wait_counts() {
        let cfg = parse(
            "
WaitToStart: Yes
ReceiveCount: 2
Replies:
  - reply_number: 1
    Messages:
      - file name: first
        delay: 0
        repeat: 1
  - reply_number: 2
    Messages:
      - file name: second
        delay: 0
        repeat: 1
  - reply_number: 3
    Messages:
      - file name: third
        delay: 50
        repeat: 0
",
        )
        .unwrap();
        assert_eq!(cfg.format, ConfigFormat::Legacy);
        let waits: Vec<_> = cfg.rules.iter().map(|r| r.wait_count).collect();
        assert_eq!(waits, [1, 2, 2]);
        assert_eq!(cfg.rules[2].delay_ms, 50);
    }

    #[test]
    fn legacy_messages_without_wait_to_start_send_on_connect() {
        let cfg = parse(
            "
WaitToStart: false
Messages:
  - file name: hello
    delay: 0
    repeat: 1
",
        )
        .unwrap();
        assert_eq!(cfg.format, ConfigFormat::Legacy);
        assert_eq!(cfg.rules[0].wait_count, 0);
    }

    #[test]
    fn empty_documents_are_rejected() {
        assert!(matches!(parse(""), Err(ConfigError::Empty)));
        assert!(matches!(parse("Messages: []"), Err(ConfigError::Empty)));
        assert!(matches!(parse("Other: 1"), Err(ConfigError::Empty)));
        assert!(matches!(parse("Messages: 3"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.yaml");
        std::fs::write(&path, "Messages:\n  - file name: resp\n    repeat: -1\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.rules, vec![MessageRule::new("resp", 0, -1, 0)]);

        let missing = load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
