//! Periodic one-line status report

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{info, warn};

use super::counters::{CountersSnapshot, SessionCounters};
use crate::ubx::{CarrierSolution, FixType};

/// Fix label, with the RTK carrier solution taking precedence
pub fn fix_label(fix_type: FixType, carrier_solution: CarrierSolution) -> &'static str {
    match carrier_solution {
        CarrierSolution::Fixed => "RTK FIXED",
        CarrierSolution::Float => "RTK FLOAT",
        _ => fix_type.label(),
    }
}

/// Render one status line from a snapshot and the message rate since the last report
pub fn render_status_line(snapshot: &CountersSnapshot, message_rate_hz: f64) -> String {
    let mut line = match &snapshot.position {
        Some(p) => format!(
            "Fix: {} | Sats: {} | Lat: {:11.7} | Lon: {:12.7} | Alt: {:7.2}m",
            fix_label(p.fix_type, p.carrier_solution),
            p.satellites,
            p.lat,
            p.lon,
            p.height
        ),
        None => "Fix: WAITING | Sats: 0 | Lat: -- | Lon: -- | Alt: --".to_string(),
    };

    match snapshot.last_offset_seconds {
        Some(offset) => line.push_str(&format!(" | Offset: {:+.3}s", offset)),
        None => line.push_str(" | Offset: --"),
    }

    line.push_str(&format!(
        " | Msgs: {} ({:.1} Hz) | Logged: {:.1} KB | RTCM: {:.1} KB",
        snapshot.frames,
        message_rate_hz,
        snapshot.bytes_logged as f64 / 1024.0,
        snapshot.relay_bytes as f64 / 1024.0
    ));

    line.push_str(match (snapshot.relay_enabled, snapshot.relay_connected) {
        (false, _) => " [no relay]",
        (true, true) => " [relay up]",
        (true, false) => " [relay down]",
    });

    if snapshot.input_stalled {
        line.push_str(" [input stalled]");
    }
    if snapshot.corrupt_frames > 0 {
        line.push_str(&format!(" [corrupt: {}]", snapshot.corrupt_frames));
    }

    line
}

/// Reads [`SessionCounters`] on a timer and logs a status line
#[derive(Debug)]
pub struct StatusReporter {
    counters: Arc<SessionCounters>,
    interval: Duration,
    last_frames: u64,
    last_report: Instant,
    relay_was_connected: bool,
    input_was_stalled: bool,
}

impl StatusReporter {
    pub fn new(counters: Arc<SessionCounters>, interval: Duration) -> Self {
        Self {
            counters,
            interval,
            last_frames: 0,
            last_report: Instant::now(),
            relay_was_connected: false,
            input_was_stalled: false,
        }
    }

    /// Build the next status line and advance the rate window
    pub fn report(&mut self) -> String {
        let snapshot = self.counters.snapshot();
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_report).as_secs_f64();

        let rate = if elapsed > 0.0 {
            snapshot.frames.saturating_sub(self.last_frames) as f64 / elapsed
        } else {
            0.0
        };
        self.last_frames = snapshot.frames;
        self.last_report = now;

        self.warn_on_transitions(&snapshot);
        render_status_line(&snapshot, rate)
    }

    fn warn_on_transitions(&mut self, snapshot: &CountersSnapshot) {
        if self.relay_dropped(snapshot) {
            warn!("Correction relay disconnected, logging continues");
        }
        if self.input_became_stalled(snapshot) {
            warn!("Receiver input stalled");
        }
    }

    /// True once per connected to disconnected edge of the relay
    ///
    /// A relay that has not connected yet is still starting, not down.
    fn relay_dropped(&mut self, snapshot: &CountersSnapshot) -> bool {
        let connected = snapshot.relay_enabled && snapshot.relay_connected;
        let dropped = self.relay_was_connected && !connected;
        self.relay_was_connected = connected;
        dropped
    }

    fn input_became_stalled(&mut self, snapshot: &CountersSnapshot) -> bool {
        let stalled = snapshot.input_stalled && !self.input_was_stalled;
        self.input_was_stalled = snapshot.input_stalled;
        stalled
    }

    /// Report every interval until shutdown is signaled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let line = self.report();
                    info!(target: "status", "{}", line);
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
    }
}
