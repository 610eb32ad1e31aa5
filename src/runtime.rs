//! # Session Runtime
//!
//! Wires the three flows of a logging run together:
//! - the receive path (serial read, frame decoder, session log, correlation)
//! - the correction relay and its single receiver writer
//! - the periodic status reporter
//!
//! The flows share only [`SessionCounters`] and the outbound queue. One
//! shutdown flag stops all of them; the receive path closes both log files
//! before the relay connection is torn down.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{GnssLoggerError, Result};
use crate::relay::{run_outbound_writer, Backoff, CorrectionRelay, NtripSettings};
use crate::serial::{self, ReceiverPort};
use crate::session::{SessionLog, SessionPaths, SessionTotals};
use crate::telemetry::{CountersSnapshot, SessionCounters, StatusReporter};
use crate::timesync::TimeCorrelationRecorder;
use crate::ubx::{DecodedMessage, DecoderStats, FrameDecoder, RawFrame};

/// First retry delay after a receiver read error
const READ_RETRY_INITIAL: Duration = Duration::from_millis(100);

/// Longest delay between receiver read retries
const READ_RETRY_MAX: Duration = Duration::from_secs(5);

/// Warns once per window when corrupt frames pile up
#[derive(Debug)]
pub struct ResyncMonitor {
    threshold: u64,
    window: Duration,
    window_start: Instant,
    baseline: u64,
    warned: bool,
}

impl ResyncMonitor {
    pub fn new(threshold: u64, window: Duration) -> Self {
        Self {
            threshold,
            window,
            window_start: Instant::now(),
            baseline: 0,
            warned: false,
        }
    }

    /// Feed the running corrupt-frame total
    ///
    /// Returns the number of corrupt frames in the current window when it
    /// first reaches the threshold, `None` otherwise.
    pub fn observe(&mut self, corrupt_total: u64, now: Instant) -> Option<u64> {
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.baseline = corrupt_total;
            self.warned = false;
        }

        let in_window = corrupt_total.saturating_sub(self.baseline);
        if self.warned || self.threshold == 0 || in_window < self.threshold {
            return None;
        }
        self.warned = true;
        Some(in_window)
    }
}

/// Receive path: bytes in, validated frames logged
///
/// Every frame the decoder emits is appended to the raw log before anything
/// else looks at it, so a correlation or counter update never reorders frames.
#[derive(Debug)]
pub struct FramePipeline {
    decoder: FrameDecoder,
    recorder: TimeCorrelationRecorder,
    log: SessionLog,
    counters: Arc<SessionCounters>,
    resync: ResyncMonitor,
}

impl FramePipeline {
    pub fn new(
        decoder: FrameDecoder,
        recorder: TimeCorrelationRecorder,
        log: SessionLog,
        counters: Arc<SessionCounters>,
        resync: ResyncMonitor,
    ) -> Self {
        Self {
            decoder,
            recorder,
            log,
            counters,
            resync,
        }
    }

    /// Build the pipeline and create the session files
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log directory or files cannot be created
    pub fn from_config(config: &Config, counters: Arc<SessionCounters>, started: DateTime<Local>) -> Result<Self> {
        let log = SessionLog::create(
            &config.logging.log_dir,
            &config.logging.file_prefix,
            started,
            config.flush_interval(),
        )?;
        let recorder = TimeCorrelationRecorder::new(config.leap_second_table()?, config.correlation_interval());

        Ok(Self::new(
            FrameDecoder::with_max_payload_len(config.decoder.max_payload_len),
            recorder,
            log,
            counters,
            ResyncMonitor::new(config.decoder.resync_warn_threshold, config.resync_window()),
        ))
    }

    /// Decode and log everything `data` completes
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes as read from the receiver
    /// * `received_at` - Local wall clock of the read, used for time correlation
    ///
    /// # Returns
    ///
    /// * `usize` - Frames logged from this chunk
    ///
    /// # Errors
    ///
    /// Returns a storage error if a write fails; the caller must stop
    pub fn process_chunk(&mut self, data: &[u8], received_at: DateTime<Utc>) -> Result<usize> {
        self.decoder.push(data);

        let mut logged = 0;
        while let Some((frame, message)) = self.decoder.next_frame() {
            self.process_frame(&frame, message.as_ref(), received_at)?;
            logged += 1;
        }

        let stats = self.decoder.stats();
        self.counters.update_decoder_stats(&stats);
        if let Some(count) = self.resync.observe(stats.corrupt_frames, Instant::now()) {
            warn!("{} corrupt frames in the last {:?}, check the receiver link", count, self.resync.window);
        }

        Ok(logged)
    }

    /// Log one validated frame and act on its decoded content
    pub fn process_frame(
        &mut self,
        frame: &RawFrame,
        message: Option<&DecodedMessage>,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        self.log.append_frame(frame)?;
        self.counters.record_frame(frame.len());

        if let Some(DecodedMessage::PositionVelocityTime(pvt)) = message {
            self.counters.record_position(pvt);
            if let Some(record) = self.recorder.record(pvt, received_at) {
                self.log.append_record(&record)?;
                self.counters.record_correlation(&record);
            }
        }

        Ok(())
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn paths(&self) -> &SessionPaths {
        self.log.paths()
    }

    /// Close both files; bytes of an unfinished frame are not logged
    pub fn finish(mut self) -> Result<SessionTotals> {
        let pending = self.decoder.pending_len();
        if pending > 0 {
            debug!("Discarding {} bytes of an unfinished frame", pending);
        }
        self.log.close()
    }
}

/// Read the receiver until shutdown, end of stream or a storage failure
///
/// Silence longer than `idle_timeout` marks the input as stalled; read errors
/// are retried with backoff. Both log files are closed before returning.
pub async fn run_receive_path<R>(
    mut reader: R,
    mut pipeline: FramePipeline,
    counters: Arc<SessionCounters>,
    idle_timeout: Duration,
    read_buffer_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<SessionTotals>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_buffer_size.max(1)];
    let mut retry = Backoff::new(READ_RETRY_INITIAL, READ_RETRY_MAX);
    let mut stalled = false;

    info!("Receive path started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let read = tokio::select! {
            result = tokio::time::timeout(idle_timeout, reader.read(&mut buf)) => result,
            _ = shutdown.changed() => break,
        };

        match read {
            Err(_) => {
                if !stalled {
                    debug!("No receiver data for {:?}", idle_timeout);
                    stalled = true;
                    counters.set_input_stalled(true);
                }
            }
            Ok(Ok(0)) => {
                warn!("Receiver stream ended");
                break;
            }
            Ok(Ok(n)) => {
                if stalled {
                    info!("Receiver data resumed");
                    stalled = false;
                    counters.set_input_stalled(false);
                }
                retry.reset();

                if let Err(e) = pipeline.process_chunk(&buf[..n], Utc::now()) {
                    error!("Storage failure, stopping: {}", e);
                    if let Err(close_err) = pipeline.finish() {
                        error!("Failed to close session log: {}", close_err);
                    }
                    return Err(e);
                }
            }
            Ok(Err(e)) => {
                let delay = retry.next_delay();
                warn!("Receiver read failed: {} (retrying in {:?})", e, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    let stats = pipeline.decoder_stats();
    info!(
        "Receive path stopping: {} frames, {} corrupt, {} skipped bytes",
        stats.frames,
        stats.corrupt_frames,
        stats.skipped_bytes
    );
    pipeline.finish()
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub paths: SessionPaths,
    pub totals: SessionTotals,
    pub counters: CountersSnapshot,
    /// Wall time from session start to the last file closed
    pub elapsed: Duration,
}

impl SessionSummary {
    /// Logged frames per second over the whole run, 0 for a zero-length run
    pub fn average_rate_hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.totals.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Last GPS-minus-system clock offset seen, if any fix carried UTC time
    pub fn final_offset_seconds(&self) -> Option<f64> {
        self.counters.last_offset_seconds
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Duration: {:.1} seconds", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Messages: {} ({:.1} Hz average)",
            self.totals.frames,
            self.average_rate_hz()
        )?;
        writeln!(f, "Data logged: {:.2} MB", self.totals.raw_bytes as f64 / 1_000_000.0)?;
        writeln!(f, "Time sync records: {}", self.totals.records)?;
        writeln!(f, "RTCM received: {:.1} KB", self.counters.relay_bytes as f64 / 1000.0)?;
        match self.final_offset_seconds() {
            Some(offset) => write!(f, "Final time offset: {:+.3} seconds", offset),
            None => write!(f, "Final time offset: n/a"),
        }
    }
}

/// Run a logging session on the configured serial port
///
/// # Errors
///
/// Returns a configuration error if the port cannot be opened and a storage
/// error if logging failed
pub async fn run_session<F>(config: &Config, shutdown: F) -> Result<SessionSummary>
where
    F: Future<Output = ()>,
{
    let (reader, sink) = serial::open_receiver(&config.serial)?;
    run_with_receiver(config, reader, sink, shutdown).await
}

/// Run a logging session over an already open receiver channel
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `reader` - Inbound half of the receiver channel
/// * `port` - Outbound half, owned by the correction writer
/// * `shutdown` - Resolves when the run should stop
pub async fn run_with_receiver<R, P, F>(config: &Config, reader: R, port: P, shutdown: F) -> Result<SessionSummary>
where
    R: AsyncRead + Unpin + Send + 'static,
    P: ReceiverPort + 'static,
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let counters = Arc::new(SessionCounters::new());
    let pipeline = FramePipeline::from_config(config, Arc::clone(&counters), Local::now())?;
    let paths = pipeline.paths().clone();

    let (stop_tx, stop_rx) = watch::channel(false);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(config.ntrip.queue_depth.max(1));

    let writer = tokio::spawn(run_outbound_writer(port, outbound_rx, Arc::clone(&counters)));

    let relay = match NtripSettings::from_config(&config.ntrip) {
        Some(settings) => {
            info!("Correction relay enabled: {}", settings.display_target());
            counters.set_relay_enabled(true);
            let relay = CorrectionRelay::new(settings, outbound_tx, Arc::clone(&counters));
            Some(tokio::spawn(relay.run(stop_rx.clone())))
        }
        None => {
            info!("Correction relay disabled, logging only");
            drop(outbound_tx);
            None
        }
    };

    let status = tokio::spawn(StatusReporter::new(Arc::clone(&counters), config.status_interval()).run(stop_rx.clone()));

    let mut receive = tokio::spawn(run_receive_path(
        reader,
        pipeline,
        Arc::clone(&counters),
        config.idle_timeout(),
        config.serial.read_buffer_size,
        stop_rx,
    ));

    let finished = tokio::select! {
        result = &mut receive => Some(result),
        _ = shutdown => {
            info!("Shutdown requested");
            None
        }
    };

    // Receive path first: its logs are closed before the relay goes away
    let _ = stop_tx.send(true);
    let received = match finished {
        Some(result) => result,
        None => receive.await,
    };
    let received = received.map_err(|e| GnssLoggerError::Storage(format!("receive task failed: {}", e)))?;

    if let Some(relay) = relay {
        match relay.await {
            Ok(Some(mut stream)) => {
                if let Err(e) = stream.shutdown().await {
                    debug!("NTRIP socket shutdown: {}", e);
                }
                info!("NTRIP connection closed");
            }
            Ok(None) => {}
            Err(e) => warn!("Correction relay task failed: {}", e),
        }
    }

    if let Err(e) = writer.await {
        warn!("Receiver writer task failed: {}", e);
    }
    if let Err(e) = status.await {
        warn!("Status reporter task failed: {}", e);
    }

    let totals = received?;
    let summary = SessionSummary {
        paths,
        totals,
        counters: counters.snapshot(),
        elapsed: started.elapsed(),
    };
    info!("Session finished");
    for line in summary.to_string().lines() {
        info!("  {}", line);
    }

    Ok(summary)
}
