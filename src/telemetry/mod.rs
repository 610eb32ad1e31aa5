//! # Telemetry Module
//!
//! Live observability of a logging session.
//!
//! This module handles:
//! - Atomic counters shared by the receive and relay flows
//! - Snapshots of those counters for non-blocking reads
//! - The periodic one-line status report

pub mod counters;
pub mod status;

pub use counters::{CountersSnapshot, PositionSummary, SessionCounters};
pub use status::{fix_label, render_status_line, StatusReporter};
