// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Outbound writer: the only path to the socket.
//!
//! Rules enqueue whole files into one FIFO; a single pump task owns the
//! write half and writes each file completely before taking the next, so
//! two files' bytes never interleave. A send resolves only after its bytes
//! were written, which keeps each rule to one outstanding send.

use crate::error::TransportError;
use crate::matcher::MatchedFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default queue depth; one slot per concurrently eligible rule is plenty.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// One file waiting to be written.
#[derive(Debug)]
pub struct Outbound {
    /// Rule that produced the send.
    pub rule: usize,
    /// File to transmit.
    pub file: MatchedFile,
    done: oneshot::Sender<()>,
}

impl Outbound {
    /// Mark the file as written, releasing the sending rule.
    pub fn complete(self) {
        let _ = self.done.send(());
    }
}

/// Cloneable handle rules use to request sends.
#[derive(Debug, Clone)]
pub struct OutboundWriter {
    tx: mpsc::Sender<Outbound>,
}

/// Receiving end of the outbound FIFO.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Outbound>,
}

/// Create a writer handle and the queue it feeds.
pub fn outbound_channel(depth: usize) -> (OutboundWriter, OutboundQueue) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (OutboundWriter { tx }, OutboundQueue { rx })
}

impl OutboundWriter {
    /// Queue `file` for rule `rule` and wait until it has been written.
    pub async fn send(&self, rule: usize, file: MatchedFile) -> Result<(), TransportError> {
        let (done, written) = oneshot::channel();
        self.tx
            .send(Outbound { rule, file, done })
            .await
            .map_err(|_| TransportError::WriterClosed)?;
        written.await.map_err(|_| TransportError::WriterClosed)
    }
}

impl OutboundQueue {
    /// Next queued file, in the order sends became eligible.
    pub async fn next(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Write queued files to `sink` until every writer handle is dropped.
    ///
    /// Returns the number of files written. The first write failure ends
    /// the pump; pending senders observe [`TransportError::WriterClosed`].
    pub async fn pump<W>(mut self, mut sink: W) -> Result<u64, TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(out) = self.next().await {
            let io = async {
                sink.write_all(&out.file.contents).await?;
                sink.flush().await
            };
            if let Err(source) = io.await {
                return Err(TransportError::Write {
                    file: out.file.name.to_string(),
                    source,
                });
            }
            written += 1;
            debug!(
                rule = out.rule,
                file = %out.file.name,
                bytes = out.file.contents.len(),
                "sent"
            );
            out.complete();
        }
        Ok(written)
    }
}
