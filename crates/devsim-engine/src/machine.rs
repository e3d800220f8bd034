// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-rule trigger state machine.
//!
//! Pure state: no timers and no I/O. The scheduler's rule task drives it by
//! waiting on [`RuleRuntime::wake_threshold`], sleeping for the rule delay,
//! and reporting sends back through [`RuleRuntime::complete_send`].
//!
//! ```text
//! Idle ─arm─▶ AwaitingTrigger ─activate─▶ Sending ─complete_send─▶ Sending | AwaitingResponse | Exhausted
//!                   │                        ▲                                  │
//!                disable                     └─────────────respond──────────────┘
//!                   ▼
//!               Exhausted
//! ```

use crate::matcher::{MatchedFile, ResolvedFiles};
use crate::rule::{MessageRule, RepeatMode};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Lifecycle state of one rule on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    /// Created, not yet armed.
    Idle,
    /// Waiting for the inbound counter to reach `wait_count`.
    AwaitingTrigger,
    /// Delay-then-send cycle in progress.
    Sending,
    /// Request-response mode: waiting for `|repeat|` more inbound messages.
    AwaitingResponse,
    /// Terminal; no further sends on this connection.
    Exhausted,
}

/// A transition was requested from a state that does not allow it.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rule in state {state:?} cannot {op}")]
pub struct InvalidTransition {
    /// State the rule was in.
    pub state: RuleState,
    /// Requested operation.
    pub op: &'static str,
}

/// Mutable progress of one rule for one connection.
#[derive(Debug, Clone)]
pub struct RuleRuntime {
    index: usize,
    rule: Arc<MessageRule>,
    state: RuleState,
    sends_completed: u64,
    rotation_cursor: usize,
    response_baseline: u64,
    files: Option<ResolvedFiles>,
    disabled: bool,
}

impl RuleRuntime {
    /// Fresh runtime in [`RuleState::Idle`] for rule number `index`.
    pub fn new(index: usize, rule: Arc<MessageRule>) -> Self {
        Self {
            index,
            rule,
            state: RuleState::Idle,
            sends_completed: 0,
            rotation_cursor: 0,
            response_baseline: 0,
            files: None,
            disabled: false,
        }
    }

    /// Position of the rule in the configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The rule being executed.
    pub fn rule(&self) -> &MessageRule {
        &self.rule
    }

    /// Current state.
    pub fn state(&self) -> RuleState {
        self.state
    }

    /// Sends issued so far.
    pub fn sends_completed(&self) -> u64 {
        self.sends_completed
    }

    /// Whether the rule was disabled by a configuration problem.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn invalid(&self, op: &'static str) -> InvalidTransition {
        InvalidTransition {
            state: self.state,
            op,
        }
    }

    /// `Idle → AwaitingTrigger`.
    pub fn arm(&mut self) -> Result<(), InvalidTransition> {
        if self.state != RuleState::Idle {
            return Err(self.invalid("arm"));
        }
        self.state = RuleState::AwaitingTrigger;
        Ok(())
    }

    /// Inbound count the rule is currently waiting for, if it is waiting.
    pub fn wake_threshold(&self) -> Option<u64> {
        match self.state {
            RuleState::AwaitingTrigger => Some(self.rule.wait_count),
            RuleState::AwaitingResponse => Some(self.response_threshold()),
            _ => None,
        }
    }

    fn response_threshold(&self) -> u64 {
        let step = match self.rule.mode() {
            RepeatMode::RequestResponse(m) => m,
            _ => 0,
        };
        self.response_baseline.saturating_add(step)
    }

    /// `AwaitingTrigger → Sending` with the rotation set fixed from here on.
    pub fn activate(&mut self, files: ResolvedFiles) -> Result<(), InvalidTransition> {
        if self.state != RuleState::AwaitingTrigger {
            return Err(self.invalid("activate"));
        }
        self.files = Some(files);
        self.state = RuleState::Sending;
        Ok(())
    }

    /// Permanently skip the rule (pattern resolved to nothing usable).
    pub fn disable(&mut self) -> Result<(), InvalidTransition> {
        if !matches!(self.state, RuleState::Idle | RuleState::AwaitingTrigger) {
            return Err(self.invalid("disable"));
        }
        self.disabled = true;
        self.state = RuleState::Exhausted;
        Ok(())
    }

    /// File the next send transmits; `None` outside [`RuleState::Sending`].
    pub fn pending_file(&self) -> Option<&MatchedFile> {
        if self.state != RuleState::Sending {
            return None;
        }
        self.files.as_ref().map(|f| f.at(self.rotation_cursor))
    }

    /// Record a completed send; `counter_now` is the inbound count once the
    /// file was written.
    ///
    /// In request-response mode that count becomes the baseline for the next
    /// reply. Returns the state the rule moved to.
    pub fn complete_send(&mut self, counter_now: u64) -> Result<RuleState, InvalidTransition> {
        let Some(files) = self.files.as_ref().filter(|_| self.state == RuleState::Sending) else {
            return Err(self.invalid("complete a send"));
        };
        self.rotation_cursor = (self.rotation_cursor + 1) % files.len();
        self.sends_completed += 1;

        self.state = match self.rule.mode() {
            RepeatMode::Finite(n) if self.sends_completed >= n => RuleState::Exhausted,
            RepeatMode::Finite(_) | RepeatMode::Forever => RuleState::Sending,
            RepeatMode::RequestResponse(_) => {
                self.response_baseline = counter_now;
                RuleState::AwaitingResponse
            }
        };
        Ok(self.state)
    }

    /// `AwaitingResponse → Sending` once the inbound count met the threshold.
    ///
    /// The baseline is recaptured when the reply has been written, so messages
    /// that arrive while it is pending do not count toward the next one.
    pub fn respond(&mut self, counter_now: u64) -> Result<(), InvalidTransition> {
        if self.state != RuleState::AwaitingResponse || counter_now < self.response_threshold() {
            return Err(self.invalid("respond"));
        }
        self.state = RuleState::Sending;
        Ok(())
    }

    /// Point-in-time view for reporting.
    pub fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            rule: self.index,
            pattern: self.rule.pattern.clone(),
            state: self.state,
            sends_completed: self.sends_completed,
            rotation_cursor: self.rotation_cursor,
            response_baseline: self.response_baseline,
            files: self.files.as_ref().map(ResolvedFiles::names).unwrap_or_default(),
            disabled: self.disabled,
        }
    }
}

/// Reportable view of a [`RuleRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSnapshot {
    /// Position of the rule in the configuration.
    pub rule: usize,
    /// Rule pattern.
    pub pattern: String,
    /// State at snapshot time.
    pub state: RuleState,
    /// Sends issued so far.
    pub sends_completed: u64,
    /// Index of the next file in the rotation.
    pub rotation_cursor: usize,
    /// Request-response baseline (inbound count).
    pub response_baseline: u64,
    /// Resolved rotation set; empty before activation.
    pub files: Vec<String>,
    /// Set when a configuration problem disabled the rule.
    pub disabled: bool,
}
