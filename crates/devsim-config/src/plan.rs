// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dispatch plan: what each rule will do, and which files it would send now.

use devsim_engine::{FilePattern, FileSource, MatchError, MessageRule};
use serde::Serialize;
use std::fmt;

/// Description of one rule against the current file set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulePlan {
    /// Position of the rule in the loaded rule list.
    pub rule: usize,
    /// Rule pattern.
    pub pattern: String,
    /// When the rule activates.
    pub trigger: String,
    /// What it does once active.
    pub behavior: String,
    /// Per-send delay in milliseconds.
    pub delay_ms: u64,
    /// Files the pattern matches right now, in rotation order.
    pub files: Vec<String>,
    /// Why no files matched, when that is the case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RulePlan {
    /// Whether the rule would be disabled if it activated now.
    pub fn is_disabled(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for RulePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}. {}", self.rule + 1, self.pattern)?;
        writeln!(f, "   trigger:  {}", self.trigger)?;
        writeln!(f, "   behavior: {}", self.behavior)?;
        writeln!(f, "   delay:    {}ms", self.delay_ms)?;
        match &self.error {
            Some(err) => write!(f, "   files:    none ({err})"),
            None => write!(f, "   files:    {}", self.files.join(", ")),
        }
    }
}

/// Plan every rule against the files `source` currently offers.
///
/// The directory is listed once; a listing failure is reported on every rule.
pub fn plan(rules: &[MessageRule], source: &dyn FileSource) -> Vec<RulePlan> {
    let listing = source.list();
    rules
        .iter()
        .enumerate()
        .map(|(rule, r)| {
            let matched = match &listing {
                Ok(names) => FilePattern::compile(&r.pattern)
                    .and_then(|pattern| pattern.select(names.iter().cloned())),
                Err(err) => Err(MatchError::Listing(std::io::Error::new(
                    err.kind(),
                    err.to_string(),
                ))),
            };
            let (files, error) = match matched {
                Ok(files) => (files, None),
                Err(err) => (Vec::new(), Some(err.to_string())),
            };
            RulePlan {
                rule,
                pattern: r.pattern.clone(),
                trigger: r.trigger().to_string(),
                behavior: r.mode().to_string(),
                delay_ms: r.delay_ms,
                files,
                error,
            }
        })
        .collect()
}
