// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Serde shapes of the YAML document, before validation.

use serde::Deserialize;
use serde_yaml::Value;

/// Top level of either format. Rule entries stay untyped so one bad entry
/// cannot fail the whole document.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawDocument {
    #[serde(rename = "Messages", default)]
    pub messages: Option<Vec<Value>>,
    #[serde(rename = "Replies", default)]
    pub replies: Option<Vec<RawReply>>,
    #[serde(rename = "WaitToStart", default)]
    pub wait_to_start: Option<WaitToStart>,
    #[serde(rename = "ReceiveCount", default)]
    pub receive_count: Option<u64>,
}

impl RawDocument {
    /// Any of the legacy-only keys present.
    pub fn is_legacy(&self) -> bool {
        self.replies.is_some() || self.wait_to_start.is_some() || self.receive_count.is_some()
    }
}

/// One legacy reply group; `reply_number` is implied by position and ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct RawReply {
    #[serde(rename = "Messages", default)]
    pub messages: Vec<Value>,
}

/// Legacy `WaitToStart` flag: YAML bool, or a yes/true/1 style word.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WaitToStart {
    Flag(bool),
    Number(i64),
    Word(String),
}

impl WaitToStart {
    pub fn enabled(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Number(n) => *n == 1,
            Self::Word(word) => matches!(word.to_ascii_lowercase().as_str(), "yes" | "true" | "1"),
        }
    }
}

/// One rule entry.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(rename = "file name")]
    pub file_name: String,
    #[serde(default)]
    pub delay: u64,
    #[serde(default = "default_repeat")]
    pub repeat: i64,
    #[serde(rename = "waitCount", default)]
    pub wait_count: u64,
}

const fn default_repeat() -> i64 {
    1
}
