// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Client helper for talking to the device simulator over Unix sockets.
//!
//! The simulator imposes no framing: every file it sends is a raw byte run.
//! Callers that know the sizes of the files they expect should use
//! [`DeviceClient::recv_exact`]; [`DeviceClient::recv`] returns whatever one
//! read delivers.

use anyhow::Result;
use bytes::Bytes;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Minimal async client over Unix sockets.
pub struct DeviceClient {
    stream: UnixStream,
}

impl DeviceClient {
    /// Connect to the simulator at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    /// Send one inbound message (one write).
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Whatever a single read delivers, or `None` if nothing arrives within `wait`.
    ///
    /// Fails with `UnexpectedEof` once the simulator has closed the socket.
    pub async fn recv(&mut self, wait: Duration) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        match timeout(wait, self.stream.read(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(closed().into()),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Ok(Err(err)) => Err(err.into()),
        }
    }

    /// Exactly `len` bytes, or `None` if they do not all arrive within `wait`.
    ///
    /// On timeout any partially read bytes are discarded.
    pub async fn recv_exact(&mut self, len: usize, wait: Duration) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; len];
        match timeout(wait, self.stream.read_exact(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(_)) => Ok(Some(Bytes::from(buf))),
            Ok(Err(err)) => Err(err.into()),
        }
    }

    /// Everything received until the line stays quiet for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.recv(quiet).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "simulator closed the connection")
}
