// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dispatch scheduler: one task per rule for one connection.
//!
//! Rule tasks share only the inbound counter (read side) and the outbound
//! writer. There is no cross-rule ordering beyond what the counter implies.
//! Dropping or shutting down a [`Dispatch`] cancels every pending delay
//! and counter wait.

use crate::counter::{CounterClosed, CounterWatch, InboundCounter};
use crate::error::{MatchError, TransportError};
use crate::machine::{InvalidTransition, RuleRuntime, RuleSnapshot, RuleState};
use crate::matcher::{self, ResolvedFiles};
use crate::rule::MessageRule;
use crate::source::FileSource;
use crate::writer::OutboundWriter;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Why a rule task stopped before reaching `Exhausted`.
#[derive(Debug)]
enum Halt {
    Disconnected,
    Transport(TransportError),
    Invalid(InvalidTransition),
}

impl From<CounterClosed> for Halt {
    fn from(_: CounterClosed) -> Self {
        Self::Disconnected
    }
}

impl From<TransportError> for Halt {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<InvalidTransition> for Halt {
    fn from(err: InvalidTransition) -> Self {
        Self::Invalid(err)
    }
}

/// Running rule tasks for one connection.
#[derive(Debug)]
pub struct Dispatch {
    tasks: JoinSet<()>,
    progress: Vec<watch::Receiver<RuleSnapshot>>,
}

impl Dispatch {
    /// Instantiate fresh runtimes for `rules` and start them concurrently.
    pub fn start(
        rules: &[Arc<MessageRule>],
        source: &Arc<dyn FileSource>,
        counter: &InboundCounter,
        writer: &OutboundWriter,
    ) -> Self {
        let mut tasks = JoinSet::new();
        let mut progress = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            let runtime = RuleRuntime::new(index, Arc::clone(rule));
            let (tx, rx) = watch::channel(runtime.snapshot());
            progress.push(rx);
            tasks.spawn(run_rule(
                runtime,
                counter.watch(),
                writer.clone(),
                Arc::clone(source),
                tx,
            ));
        }
        Self { tasks, progress }
    }

    /// Progress feed for rule `index`.
    pub fn watch_rule(&self, index: usize) -> Option<watch::Receiver<RuleSnapshot>> {
        self.progress.get(index).cloned()
    }

    /// Latest snapshot of every rule, in configuration order.
    pub fn snapshots(&self) -> Vec<RuleSnapshot> {
        self.progress.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Wait for every rule task to finish on its own.
    pub async fn join(mut self) -> Vec<RuleSnapshot> {
        drain(&mut self.tasks).await;
        self.snapshots()
    }

    /// Cancel every rule task and wait for the cancellations to land.
    pub async fn shutdown(mut self) -> Vec<RuleSnapshot> {
        self.tasks.abort_all();
        drain(&mut self.tasks).await;
        self.snapshots()
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            if err.is_panic() {
                error!(?err, "rule task panicked");
            }
        }
    }
}

async fn run_rule(
    mut runtime: RuleRuntime,
    counter: CounterWatch,
    writer: OutboundWriter,
    source: Arc<dyn FileSource>,
    progress: watch::Sender<RuleSnapshot>,
) {
    let rule = runtime.index();
    match drive(&mut runtime, counter, &writer, &source, &progress).await {
        Ok(()) => {}
        Err(Halt::Disconnected) => debug!(rule, "rule stopped: connection closed"),
        Err(Halt::Transport(err)) => debug!(rule, %err, "rule stopped: transport closed"),
        Err(Halt::Invalid(err)) => error!(rule, %err, "rule stopped: invalid transition"),
    }
    progress.send_replace(runtime.snapshot());
}

async fn drive(
    rt: &mut RuleRuntime,
    mut counter: CounterWatch,
    writer: &OutboundWriter,
    source: &Arc<dyn FileSource>,
    progress: &watch::Sender<RuleSnapshot>,
) -> Result<(), Halt> {
    let rule = rt.index();
    loop {
        match rt.state() {
            RuleState::Idle => rt.arm()?,
            RuleState::AwaitingTrigger => {
                let seen = counter.reached(rt.rule().wait_count).await?;
                match resolve_files(rt.rule().pattern.clone(), Arc::clone(source)).await {
                    Ok(files) => {
                        info!(rule, inbound = seen, files = files.len(), "rule activated");
                        rt.activate(files)?;
                    }
                    Err(err) => {
                        warn!(rule, %err, "rule disabled");
                        rt.disable()?;
                    }
                }
            }
            RuleState::Sending => {
                let delay = rt.rule().delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let Some(file) = rt.pending_file().cloned() else {
                    return Err(Halt::Invalid(InvalidTransition {
                        state: rt.state(),
                        op: "send",
                    }));
                };
                writer.send(rule, file).await?;
                if rt.complete_send(counter.current())? == RuleState::Exhausted {
                    info!(rule, sends = rt.sends_completed(), "rule completed");
                }
            }
            RuleState::AwaitingResponse => {
                let threshold = rt.wake_threshold().unwrap_or(u64::MAX);
                let seen = counter.reached(threshold).await?;
                rt.respond(seen)?;
            }
            RuleState::Exhausted => return Ok(()),
        }
        progress.send_replace(rt.snapshot());
    }
}

/// Resolve off the async workers; listing and reading touch the filesystem.
async fn resolve_files(
    pattern: String,
    source: Arc<dyn FileSource>,
) -> Result<ResolvedFiles, MatchError> {
    tokio::task::spawn_blocking(move || matcher::resolve(&pattern, source.as_ref()))
        .await
        .unwrap_or_else(|err| Err(MatchError::Listing(io::Error::other(err))))
}
