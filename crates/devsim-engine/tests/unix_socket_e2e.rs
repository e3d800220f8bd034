// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end sessions over a real Unix socket.

use devsim_client::DeviceClient;
use devsim_engine::{
    Acceptor, DeviceServer, DirSource, MessageRule, RuleState, SessionEnd, TransportError,
};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

struct Running {
    socket: PathBuf,
    stop: watch::Sender<bool>,
    task: JoinHandle<u64>,
    _dir: TempDir,
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn spawn_server(dir: TempDir, rules: Vec<MessageRule>) -> Running {
    let socket = dir.path().join("device.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let server = DeviceServer::new(rules, Arc::new(DirSource::new(dir.path())));
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move { server.serve(&listener, stop_rx, false).await });
    Running {
        socket,
        stop,
        task,
        _dir: dir,
    }
}

impl Running {
    async fn stop(self) -> u64 {
        self.stop.send(true).unwrap();
        self.task.await.unwrap()
    }
}

#[tokio::test]
async fn immediate_request_response_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "resp_data", b"PONG");
    let server = spawn_server(dir, vec![MessageRule::new("resp_data", 0, -1, 0)]);

    let mut client = DeviceClient::connect(&server.socket).await.unwrap();
    let greeting = client.recv_exact(4, WAIT).await.unwrap().expect("greeting");
    assert_eq!(greeting.as_ref(), b"PONG");

    for i in 0..3 {
        client.send(format!("ping {i}").as_bytes()).await.unwrap();
        let reply = client.recv_exact(4, WAIT).await.unwrap().expect("reply");
        assert_eq!(reply.as_ref(), b"PONG");
    }
    assert!(client.recv(QUIET).await.unwrap().is_none());

    drop(client);
    assert_eq!(server.stop().await, 1);
}

#[tokio::test]
async fn reconnect_starts_from_fresh_rule_state() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "hello", b"HELLO");
    write_file(dir.path(), "second", b"2ND");
    let server = spawn_server(
        dir,
        vec![
            MessageRule::new("hello", 0, -1, 0),
            MessageRule::new("second", 0, 1, 1),
        ],
    );

    let mut first = DeviceClient::connect(&server.socket).await.unwrap();
    assert_eq!(first.recv_exact(5, WAIT).await.unwrap().unwrap().as_ref(), b"HELLO");
    drop(first);

    // counter and request-response baseline start over
    let mut second = DeviceClient::connect(&server.socket).await.unwrap();
    assert_eq!(second.recv_exact(5, WAIT).await.unwrap().unwrap().as_ref(), b"HELLO");
    assert!(second.recv(QUIET).await.unwrap().is_none());

    second.send(b"go").await.unwrap();
    // the reply and the triggered file race; either order is valid
    let got = second.recv_exact(8, WAIT).await.unwrap().expect("two files");
    assert!(
        got.as_ref() == b"HELLO2ND" || got.as_ref() == b"2NDHELLO",
        "{got:?}"
    );

    drop(second);
    assert_eq!(server.stop().await, 2);
}

#[tokio::test]
async fn files_from_concurrent_rules_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "block_a", &[0xAA; 4096]);
    write_file(dir.path(), "block_b", &[0xBB; 4096]);
    let server = spawn_server(
        dir,
        vec![
            MessageRule::new("block_a", 0, 1, 1),
            MessageRule::new("block_b", 0, 1, 1),
        ],
    );

    let mut client = DeviceClient::connect(&server.socket).await.unwrap();
    client.send(b"trigger").await.unwrap();
    let got = client.recv_exact(8192, WAIT).await.unwrap().expect("both blocks");
    let (first, second) = got.split_at(4096);
    assert!(first.iter().all(|b| *b == first[0]));
    assert!(second.iter().all(|b| *b == second[0]));
    assert_ne!(first[0], second[0]);

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn triggered_finite_rule_goes_quiet_after_its_sends() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "status_1", b"S1");
    write_file(dir.path(), "status_2", b"S2");
    let server = spawn_server(dir, vec![MessageRule::new("status_.*", 20, 3, 2)]);

    let mut client = DeviceClient::connect(&server.socket).await.unwrap();
    client.send(b"one").await.unwrap();
    assert!(client.recv(QUIET).await.unwrap().is_none());

    client.send(b"two").await.unwrap();
    let got = client.recv_exact(6, WAIT).await.unwrap().expect("three sends");
    assert_eq!(got.as_ref(), b"S1S2S1");

    client.send(b"three").await.unwrap();
    assert!(client.recv(QUIET).await.unwrap().is_none());

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn session_report_counts_messages_and_sends() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "resp", b"R");
    let server = DeviceServer::new(
        vec![
            MessageRule::new("resp", 0, -1, 0),
            MessageRule::new("nothing_here", 0, 1, 0),
        ],
        Arc::new(DirSource::new(dir.path())),
    );

    let (client, conn) = tokio::io::duplex(256);
    let (_stop, mut stop_rx) = watch::channel(false);
    let session = tokio::spawn(async move { server.run_connection(conn, &mut stop_rx).await });

    let (mut rd, mut wr) = tokio::io::split(client);
    let mut byte = [0u8; 1];
    rd.read_exact(&mut byte).await.unwrap();
    wr.write_all(b"x").await.unwrap();
    rd.read_exact(&mut byte).await.unwrap();
    // let the rule record its second send before hanging up
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(wr);
    drop(rd);

    let report = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
    assert!(matches!(report.end, SessionEnd::ClientClosed));
    assert_eq!(report.inbound_messages, 1);
    assert_eq!(report.frames_sent, 2);
    assert_eq!(report.rules[0].state, RuleState::AwaitingResponse);
    assert!(report.rules[1].disabled);
}

#[tokio::test]
async fn shutdown_ends_an_open_session() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "never", b"N");
    let server = spawn_server(dir, vec![MessageRule::new("never", 0, 1, 100)]);

    let _client = DeviceClient::connect(&server.socket).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let served = tokio::time::timeout(WAIT, server.stop()).await.unwrap();
    assert_eq!(served, 1);
}

/// Client that never speaks and whose socket rejects every write.
struct BrokenPeer;

impl AsyncRead for BrokenPeer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenPeer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Client whose socket accepts writes but errors on read.
struct ResetPeer;

impl AsyncRead for ResetPeer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
    }
}

impl AsyncWrite for ResetPeer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn greeting_and_waiting_rules(dir: &Path) -> DeviceServer {
    write_file(dir, "stream", b"S");
    write_file(dir, "later", b"L");
    DeviceServer::new(
        vec![
            MessageRule::new("stream", 0, 0, 0),
            MessageRule::new("later", 0, 1, 5),
        ],
        Arc::new(DirSource::new(dir)),
    )
}

#[tokio::test]
async fn failed_write_tears_down_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let server = greeting_and_waiting_rules(dir.path());
    let (_stop, mut stop_rx) = watch::channel(false);

    // returning at all means every rule task was cancelled and joined
    let report = tokio::time::timeout(WAIT, server.run_connection(BrokenPeer, &mut stop_rx))
        .await
        .expect("session ends on write failure");

    match &report.end {
        SessionEnd::Transport(TransportError::Write { file, .. }) => assert_eq!(file, "stream"),
        other => panic!("unexpected end: {other:?}"),
    }
    assert_eq!(report.frames_sent, 0);
    assert_eq!(report.rules[0].sends_completed, 0);
    assert_eq!(report.rules[1].state, RuleState::AwaitingTrigger);
}

#[tokio::test]
async fn read_error_ends_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let server = greeting_and_waiting_rules(dir.path());
    let (_stop, mut stop_rx) = watch::channel(false);

    let report = tokio::time::timeout(WAIT, server.run_connection(ResetPeer, &mut stop_rx))
        .await
        .expect("session ends on read failure");

    assert!(matches!(
        report.end,
        SessionEnd::Transport(TransportError::Read(_))
    ));
    assert_eq!(report.inbound_messages, 0);
    assert_eq!(report.rules[1].state, RuleState::AwaitingTrigger);
    assert_eq!(report.rules[1].sends_completed, 0);
}

/// Listener that replays a scripted sequence of accept results, then idles.
struct ScriptedListener {
    results: Mutex<VecDeque<io::Result<DuplexStream>>>,
}

impl Acceptor for ScriptedListener {
    type Stream = DuplexStream;

    async fn accept(&self) -> io::Result<DuplexStream> {
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn accept_error_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "later", b"L");
    let server = DeviceServer::new(
        vec![MessageRule::new("later", 0, 1, 5)],
        Arc::new(DirSource::new(dir.path())),
    );

    let (client, conn) = tokio::io::duplex(64);
    drop(client);
    let listener = ScriptedListener {
        results: Mutex::new(VecDeque::from([
            Err(io::Error::from_raw_os_error(24)),
            Ok(conn),
        ])),
    };
    let (_stop, stop_rx) = watch::channel(false);

    let served = tokio::time::timeout(WAIT, server.serve(&listener, stop_rx, true))
        .await
        .expect("server keeps accepting after an error");
    assert_eq!(served, 1);
}
