// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Connection manager: accept one client at a time and own its rule state.

use crate::counter::InboundCounter;
use crate::error::TransportError;
use crate::machine::RuleSnapshot;
use crate::rule::MessageRule;
use crate::scheduler::Dispatch;
use crate::source::FileSource;
use crate::writer::{outbound_channel, DEFAULT_QUEUE_DEPTH};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One discrete read is one inbound message.
const READ_BUFFER_BYTES: usize = 4096;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of client connections.
pub trait Acceptor {
    /// Connected client stream.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Wait for the next client.
    fn accept(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

impl Acceptor for UnixListener {
    type Stream = UnixStream;

    async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = UnixListener::accept(self).await?;
        Ok(stream)
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client closed its end.
    ClientClosed,
    /// The server was asked to stop.
    Shutdown,
    /// A socket read or write failed.
    Transport(TransportError),
}

/// Outcome of one client connection.
#[derive(Debug)]
pub struct SessionReport {
    /// Inbound messages counted.
    pub inbound_messages: u64,
    /// Files written to the client.
    pub frames_sent: u64,
    /// Final state of every rule.
    pub rules: Vec<RuleSnapshot>,
    /// Why the session ended.
    pub end: SessionEnd,
}

/// The simulated device: a rule set plus the files it serves.
pub struct DeviceServer {
    rules: Arc<[Arc<MessageRule>]>,
    source: Arc<dyn FileSource>,
}

impl DeviceServer {
    /// Serve `rules` using files from `source`.
    pub fn new(rules: Vec<MessageRule>, source: Arc<dyn FileSource>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
            source,
        }
    }

    /// Accept clients on `listener`, one session at a time, until shutdown.
    ///
    /// A failed accept is logged and retried. With `once`, returns after the
    /// first session. Returns the number of sessions served.
    pub async fn serve<A>(
        &self,
        listener: &A,
        mut shutdown: watch::Receiver<bool>,
        once: bool,
    ) -> u64
    where
        A: Acceptor + Sync,
    {
        let mut sessions = 0u64;
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                () = shutdown_requested(&mut shutdown) => break,
            };
            let stream = match accepted {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(%err, "accept failed");
                    tokio::select! {
                        () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => continue,
                        () = shutdown_requested(&mut shutdown) => break,
                    }
                }
            };
            sessions += 1;
            info!(session = sessions, "client connected");

            let report = self.run_connection(stream, &mut shutdown).await;
            log_report(sessions, &report);

            if once || matches!(report.end, SessionEnd::Shutdown) {
                break;
            }
        }
        sessions
    }

    /// Run one session on `stream` until the client leaves, a transport
    /// error occurs, or `shutdown` flips to true.
    ///
    /// Every rule starts fresh with a counter at zero; nothing carries over
    /// to the next call.
    pub async fn run_connection<S>(
        &self,
        stream: S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionReport
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(stream);
        let (writer, queue) = outbound_channel(DEFAULT_QUEUE_DEPTH);
        let mut pump = tokio::spawn(queue.pump(write_half));
        let mut pump_running = true;

        let counter = InboundCounter::new();
        let dispatch = Dispatch::start(&self.rules, &self.source, &counter, &writer);
        drop(writer);

        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        let end = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break SessionEnd::ClientClosed,
                    Ok(n) => {
                        counter.observe(&buf[..n]);
                    }
                    Err(err) => break SessionEnd::Transport(TransportError::Read(err)),
                },
                res = &mut pump, if pump_running => {
                    pump_running = false;
                    match res {
                        // Every rule finished; keep counting until the client leaves.
                        Ok(Ok(_)) => {}
                        Ok(Err(err)) => break SessionEnd::Transport(err),
                        Err(err) => {
                            warn!(?err, "outbound writer task failed");
                            break SessionEnd::Transport(TransportError::WriterClosed);
                        }
                    }
                }
                () = shutdown_requested(shutdown) => break SessionEnd::Shutdown,
            }
        };

        if pump_running {
            pump.abort();
        }
        let inbound_messages = counter.value();
        drop(counter);
        let rules = dispatch.shutdown().await;
        let frames_sent = rules.iter().map(|r| r.sends_completed).sum();

        SessionReport {
            inbound_messages,
            frames_sent,
            rules,
            end,
        }
    }
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn log_report(session: u64, report: &SessionReport) {
    match &report.end {
        SessionEnd::Transport(err) => warn!(session, %err, "connection dropped"),
        end => info!(session, ?end, "client disconnected"),
    }
    info!(
        session,
        inbound = report.inbound_messages,
        frames = report.frames_sent,
        "session summary"
    );
    for rule in &report.rules {
        debug!(
            session,
            rule = rule.rule,
            state = ?rule.state,
            sends = rule.sends_completed,
            disabled = rule.disabled,
            "rule final state"
        );
    }
}
