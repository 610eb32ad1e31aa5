//! # Correction Relay Module
//!
//! Forwards NTRIP correction bytes to the receiver, uninterpreted.
//!
//! This module handles:
//! - Connecting to the caster and reconnecting with exponential backoff
//! - Queueing correction chunks on a bounded channel (a full queue stops the
//!   socket reads, so the caster is throttled by TCP flow control)
//! - A single writer task that owns the receiver's outbound half
//!
//! The receive path never touches any of this; the two directions share only
//! the session counters.

pub mod ntrip;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::serial::ReceiverPort;
use crate::telemetry::SessionCounters;
pub use ntrip::{NtripSettings, ResponseBody};

/// Socket read size for correction data
const READ_CHUNK_SIZE: usize = 4096;

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// How a connected session ended
enum StreamEnd {
    Shutdown(TcpStream),
    Lost(String),
    WriterGone,
}

enum Enqueue {
    Queued,
    WriterGone,
    Shutdown,
}

/// NTRIP relay: caster socket to outbound queue
#[derive(Debug)]
pub struct CorrectionRelay {
    settings: NtripSettings,
    outbound: mpsc::Sender<Bytes>,
    counters: Arc<SessionCounters>,
}

impl CorrectionRelay {
    pub fn new(settings: NtripSettings, outbound: mpsc::Sender<Bytes>, counters: Arc<SessionCounters>) -> Self {
        Self {
            settings,
            outbound,
            counters,
        }
    }

    /// Relay until shutdown
    ///
    /// Connection failures are logged and retried; they never end the task.
    ///
    /// # Returns
    ///
    /// * `Option<TcpStream>` - The live caster connection at shutdown, for the
    ///   caller to close
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Option<TcpStream> {
        let target = self.settings.display_target();
        let mut backoff = Backoff::new(self.settings.reconnect_interval, self.settings.max_reconnect_interval);

        loop {
            if *shutdown.borrow() {
                return None;
            }

            let attempt = tokio::select! {
                result = ntrip::connect(&self.settings) => result,
                _ = shutdown.changed() => return None,
            };

            match attempt {
                Ok((stream, body)) => {
                    let auth = if self.settings.credentials.is_some() { " (authenticated)" } else { "" };
                    info!("Connected to NTRIP: {}{}", target, auth);
                    backoff.reset();
                    self.counters.set_relay_connected(true);

                    let end = self.forward(stream, body, &mut shutdown).await;
                    self.counters.set_relay_connected(false);

                    match end {
                        StreamEnd::Shutdown(stream) => return Some(stream),
                        StreamEnd::WriterGone => {
                            warn!("Receiver writer stopped, correction relay exiting");
                            return None;
                        }
                        StreamEnd::Lost(reason) => {
                            warn!("NTRIP connection lost: {}", reason);
                            self.counters.record_relay_reconnect();
                        }
                    }
                }
                Err(e) => warn!("NTRIP connection to {} failed: {}", target, e),
            }

            let delay = backoff.next_delay();
            info!("Reconnecting to NTRIP in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return None,
            }
        }
    }

    async fn forward(
        &self,
        mut stream: TcpStream,
        mut body: ResponseBody,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        let leftover = std::mem::take(&mut body.leftover);
        if !leftover.is_empty() {
            match self.enqueue(leftover, shutdown).await {
                Enqueue::Queued => {}
                Enqueue::WriterGone => return StreamEnd::WriterGone,
                Enqueue::Shutdown => return StreamEnd::Shutdown(stream),
            }
        }

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = tokio::select! {
                result = stream.read(&mut buf) => result,
                _ = shutdown.changed() => return StreamEnd::Shutdown(stream),
            };

            let chunk = match read {
                Ok(0) => return StreamEnd::Lost("caster closed the stream".to_string()),
                Ok(n) => body.strip_blank_line(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => return StreamEnd::Lost(e.to_string()),
            };
            if chunk.is_empty() {
                continue;
            }

            match self.enqueue(chunk, shutdown).await {
                Enqueue::Queued => {}
                Enqueue::WriterGone => return StreamEnd::WriterGone,
                Enqueue::Shutdown => return StreamEnd::Shutdown(stream),
            }
        }
    }

    /// Queue one chunk, waiting while the queue is full
    async fn enqueue(&self, chunk: Bytes, shutdown: &mut watch::Receiver<bool>) -> Enqueue {
        debug!("Received {} correction bytes", chunk.len());
        tokio::select! {
            sent = self.outbound.send(chunk) => match sent {
                Ok(()) => Enqueue::Queued,
                Err(_) => Enqueue::WriterGone,
            },
            _ = shutdown.changed() => Enqueue::Shutdown,
        }
    }
}

/// Write queued correction chunks to the receiver until every sender is gone
///
/// Write failures are counted and logged; the writer keeps consuming so the
/// relay never stalls on a flaky receiver.
///
/// # Returns
///
/// * `P` - The port, once the queue is closed and drained
pub async fn run_outbound_writer<P>(mut port: P, mut queue: mpsc::Receiver<Bytes>, counters: Arc<SessionCounters>) -> P
where
    P: ReceiverPort,
{
    while let Some(chunk) = queue.recv().await {
        let result = match port.write_all(&chunk).await {
            Ok(()) => port.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => counters.record_relay_chunk(chunk.len()),
            Err(e) => {
                counters.record_relay_write_error();
                warn!("Failed to write {} correction bytes to receiver: {}", chunk.len(), e);
            }
        }
    }

    debug!("Outbound queue closed, writer exiting");
    port
}
