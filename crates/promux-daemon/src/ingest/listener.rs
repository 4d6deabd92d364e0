//! Unix-socket accept loop.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::obs::Telemetry;

/// Accept connections one at a time, read each to EOF, and hand the whole
/// payload to the decoder pool. Per-connection errors are counted and the
/// loop continues; it only returns when the payload channel closes.
pub async fn run(
    listener: UnixListener,
    payload_tx: mpsc::Sender<Bytes>,
    read_timeout: Option<Duration>,
    telemetry: Telemetry,
) {
    loop {
        let mut stream = match listener.accept().await {
            Ok((stream, _addr)) => stream,
            Err(err) => {
                telemetry.error();
                warn!(%err, "accept failed");
                continue;
            }
        };

        let payload = match read_payload(&mut stream, read_timeout).await {
            Ok(payload) => payload,
            Err(err) => {
                telemetry.error();
                warn!(%err, "connection read failed");
                continue;
            }
        };

        debug!(bytes = payload.len(), "payload received");
        if payload_tx.send(payload).await.is_err() {
            // decoder pool is gone; we are shutting down
            return;
        }
    }
}

async fn read_payload(
    stream: &mut UnixStream,
    read_timeout: Option<Duration>,
) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    match read_timeout {
        Some(limit) => {
            tokio::time::timeout(limit, stream.read_to_end(&mut buf))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "connection read timed out")
                })??;
        }
        None => {
            stream.read_to_end(&mut buf).await?;
        }
    }
    Ok(Bytes::from(buf))
}
