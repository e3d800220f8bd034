// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Message dispatch engine for the Unix-socket device simulator.
//!
//! A [`DeviceServer`] accepts one client at a time. For each connection it
//! creates a fresh [`InboundCounter`] and one [`RuleRuntime`] per configured
//! [`MessageRule`], runs every rule as its own task, and funnels their sends
//! through a single [`OutboundWriter`] so files never interleave on the wire.

pub mod counter;
pub mod error;
pub mod machine;
pub mod matcher;
pub mod rule;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod writer;

pub use counter::{CounterClosed, CounterWatch, InboundCounter};
pub use error::{MatchError, TransportError};
pub use machine::{InvalidTransition, RuleRuntime, RuleSnapshot, RuleState};
pub use matcher::{resolve, FilePattern, MatchedFile, ResolvedFiles};
pub use rule::{MessageRule, RepeatMode, Trigger};
pub use scheduler::Dispatch;
pub use session::{Acceptor, DeviceServer, SessionEnd, SessionReport};
pub use source::{DirSource, FileSource, MemorySource};
pub use writer::{outbound_channel, Outbound, OutboundQueue, OutboundWriter};

use std::path::PathBuf;

/// Default Unix socket path for the simulator.
///
/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to `/tmp`
/// when unavailable.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    base.join("devsim.sock")
}
