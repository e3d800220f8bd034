// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Immutable message rule configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One configured (pattern, delay, repeat, waitCount) tuple.
///
/// `repeat > 0` sends exactly that many times, `repeat == 0` sends forever,
/// and `repeat < 0` alternates one send with waiting for `|repeat|` inbound
/// messages. `wait_count == 0` is eligible on connect; otherwise the rule
/// activates once the inbound counter reaches `wait_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRule {
    /// Regular expression over file names (anchored at the start of the name).
    pub pattern: String,
    /// Milliseconds to wait before each individual send.
    pub delay_ms: u64,
    /// Repetition policy; see [`RepeatMode`].
    pub repeat: i64,
    /// Inbound message count that activates the rule (0 = immediately).
    pub wait_count: u64,
}

impl MessageRule {
    /// Build a rule from its four fields.
    pub fn new(pattern: impl Into<String>, delay_ms: u64, repeat: i64, wait_count: u64) -> Self {
        Self {
            pattern: pattern.into(),
            delay_ms,
            repeat,
            wait_count,
        }
    }

    /// Per-send delay.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Decoded repetition policy.
    pub fn mode(&self) -> RepeatMode {
        RepeatMode::from_repeat(self.repeat)
    }

    /// Decoded activation trigger.
    pub fn trigger(&self) -> Trigger {
        match self.wait_count {
            0 => Trigger::Immediate,
            n => Trigger::AfterMessages(n),
        }
    }
}

/// How often a rule sends once activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count")]
pub enum RepeatMode {
    /// Send exactly this many times, then stop.
    Finite(u64),
    /// Send for the life of the connection.
    Forever,
    /// Send once, then once more per this many inbound messages.
    RequestResponse(u64),
}

impl RepeatMode {
    /// Decode the signed `repeat` field.
    pub fn from_repeat(repeat: i64) -> Self {
        match repeat {
            0 => Self::Forever,
            n if n > 0 => Self::Finite(n.unsigned_abs()),
            n => Self::RequestResponse(n.unsigned_abs()),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(1) => write!(f, "send once"),
            Self::Finite(n) => write!(f, "send {n} times then stop"),
            Self::Forever => write!(f, "send continuously"),
            Self::RequestResponse(n) => {
                write!(f, "request-response, {n} client message(s) between sends")
            }
        }
    }
}

/// When a rule becomes eligible to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count")]
pub enum Trigger {
    /// Eligible as soon as the connection is accepted.
    Immediate,
    /// Eligible once this many inbound messages have been observed.
    AfterMessages(u64),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediately"),
            Self::AfterMessages(n) => write!(f, "after {n} client message(s)"),
        }
    }
}
