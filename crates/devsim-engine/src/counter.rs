// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-connection inbound message counter.
//!
//! Single writer (the receive loop), many readers (rule tasks). Readers
//! wait on thresholds rather than individual increments, so a burst that
//! advances the counter several times before a reader runs can never make
//! it miss its threshold.

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace};

/// The counter's writer has gone away (the connection ended).
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("inbound counter closed")]
pub struct CounterClosed;

/// Monotonic count of complete inbound client messages.
#[derive(Debug)]
pub struct InboundCounter {
    tx: watch::Sender<u64>,
}

impl Default for InboundCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundCounter {
    /// Fresh counter at zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Record one complete inbound message and notify every watcher.
    ///
    /// Returns the new count. The payload is only logged, never interpreted.
    pub fn observe(&self, message: &[u8]) -> u64 {
        let mut count = 0;
        self.tx.send_modify(|v| {
            *v += 1;
            count = *v;
        });
        debug!(inbound = count, bytes = message.len(), "client message");
        trace!(payload = %hex::encode(message), "client payload");
        count
    }

    /// Current count.
    pub fn value(&self) -> u64 {
        *self.tx.borrow()
    }

    /// A new reader handle.
    pub fn watch(&self) -> CounterWatch {
        CounterWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader side of an [`InboundCounter`].
#[derive(Debug, Clone)]
pub struct CounterWatch {
    rx: watch::Receiver<u64>,
}

impl CounterWatch {
    /// Current count (never goes backward between calls).
    pub fn current(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Wait until the count is at least `threshold`; returns the observed count.
    ///
    /// Resolves immediately when the threshold is already met.
    pub async fn reached(&mut self, threshold: u64) -> Result<u64, CounterClosed> {
        let seen = self
            .rx
            .wait_for(|count| *count >= threshold)
            .await
            .map_err(|_| CounterClosed)?;
        Ok(*seen)
    }
}
