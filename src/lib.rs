//! # GNSS Logger Library
//!
//! Log raw u-blox receiver data for post-processed kinematics while relaying
//! NTRIP corrections back to the receiver.
//!
//! This library provides the frame decoder, the session log and time
//! correlation writers, the correction relay, live status reporting and the
//! offline validator for finished logs.

pub mod cli;
pub mod config;
pub mod error;
pub mod relay;
pub mod runtime;
pub mod serial;
pub mod session;
pub mod telemetry;
pub mod timesync;
pub mod ubx;
pub mod validate;
