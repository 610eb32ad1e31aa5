//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; a missing key falls back to its default.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GnssLoggerError, Result};
use crate::timesync::leap::{default_leap_seconds, LeapSecondEntry, LeapSecondTable};
use crate::ubx::protocol::UBX_MAX_PAYLOAD_SIZE;

/// Baud rates the receiver UART can be configured for
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 38400, 57600, 115200, 230400, 460800, 921600];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub ntrip: NtripConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub time: TimeConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Receiver serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// No bytes for this long is reported as a stalled input
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

/// NTRIP correction source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NtripConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ntrip_port")]
    pub port: u16,

    #[serde(default)]
    pub mountpoint: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_max_reconnect_interval_ms")]
    pub max_reconnect_interval_ms: u64,

    /// Correction chunks buffered ahead of the receiver write
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Session log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Daily-rolling diagnostics log; console only when unset
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

/// Frame decoder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DecoderConfig {
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,

    #[serde(default = "default_resync_warn_threshold")]
    pub resync_warn_threshold: u64,

    #[serde(default = "default_resync_window_ms")]
    pub resync_window_ms: u64,
}

/// Time correlation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimeConfig {
    /// Minimum time between correlation records; 0 records every fix
    #[serde(default)]
    pub correlation_interval_ms: u64,

    #[serde(default = "default_leap_seconds")]
    pub leap_seconds: Vec<LeapSecondEntry>,
}

/// Status reporter configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_status_interval_ms")]
    pub interval_ms: u64,
}

/// Validator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_expected_rate_hz")]
    pub expected_rate_hz: f64,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyAMA4".to_string() }
fn default_baud_rate() -> u32 { 460800 }
fn default_idle_timeout_ms() -> u64 { 5000 }
fn default_read_buffer_size() -> usize { 4096 }

fn default_ntrip_port() -> u16 { 2101 }
fn default_connect_timeout_ms() -> u64 { 10000 }
fn default_reconnect_interval_ms() -> u64 { 1000 }
fn default_max_reconnect_interval_ms() -> u64 { 30000 }
fn default_queue_depth() -> usize { 64 }

fn default_log_dir() -> PathBuf { PathBuf::from("./data") }
fn default_file_prefix() -> String { "gps_log".to_string() }
fn default_flush_interval_ms() -> u64 { 1000 }

fn default_max_payload_len() -> usize { 8192 }
fn default_resync_warn_threshold() -> u64 { 50 }
fn default_resync_window_ms() -> u64 { 10000 }

fn default_status_interval_ms() -> u64 { 1000 }

fn default_expected_rate_hz() -> f64 { 10.0 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            idle_timeout_ms: default_idle_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Default for NtripConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_ntrip_port(),
            mountpoint: String::new(),
            username: None,
            password: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_interval_ms: default_max_reconnect_interval_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_prefix: default_file_prefix(),
            flush_interval_ms: default_flush_interval_ms(),
            diagnostics_dir: None,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_payload_len: default_max_payload_len(),
            resync_warn_threshold: default_resync_warn_threshold(),
            resync_window_ms: default_resync_window_ms(),
        }
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            correlation_interval_ms: 0,
            leap_seconds: default_leap_seconds(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_status_interval_ms(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_rate_hz: default_expected_rate_hz(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gnss_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Leap second table built from the `[time]` section
    pub fn leap_second_table(&self) -> Result<LeapSecondTable> {
        LeapSecondTable::new(self.time.leap_seconds.clone())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.idle_timeout_ms == 0 || self.serial.idle_timeout_ms > 600000 {
            return Err(invalid("idle_timeout_ms must be between 1 and 600000"));
        }

        if self.serial.read_buffer_size < 64 || self.serial.read_buffer_size > 1 << 20 {
            return Err(invalid("read_buffer_size must be between 64 and 1048576"));
        }

        // NTRIP, only checked when a correction source is configured
        if self.ntrip.enabled {
            if self.ntrip.host.is_empty() {
                return Err(invalid("ntrip host cannot be empty when enabled"));
            }

            if self.ntrip.mountpoint.is_empty() {
                return Err(invalid("ntrip mountpoint cannot be empty when enabled"));
            }

            if self.ntrip.port == 0 {
                return Err(invalid("ntrip port must be greater than 0"));
            }
        }

        if self.ntrip.username.is_some() != self.ntrip.password.is_some() {
            return Err(invalid("ntrip username and password must be set together"));
        }

        if self.ntrip.connect_timeout_ms == 0 || self.ntrip.connect_timeout_ms > 120000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 120000"));
        }

        if self.ntrip.reconnect_interval_ms == 0 || self.ntrip.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.ntrip.max_reconnect_interval_ms < self.ntrip.reconnect_interval_ms
            || self.ntrip.max_reconnect_interval_ms > 600000
        {
            return Err(invalid(
                "max_reconnect_interval_ms must be between reconnect_interval_ms and 600000",
            ));
        }

        if self.ntrip.queue_depth == 0 || self.ntrip.queue_depth > 4096 {
            return Err(invalid("queue_depth must be between 1 and 4096"));
        }

        // Logging
        if self.logging.log_dir.as_os_str().is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        if self.logging.file_prefix.is_empty()
            || self.logging.file_prefix.contains(['/', '\\'])
        {
            return Err(invalid("file_prefix must be a non-empty file name"));
        }

        if self.logging.flush_interval_ms > 60000 {
            return Err(invalid("flush_interval_ms must be at most 60000"));
        }

        // Decoder
        if self.decoder.max_payload_len == 0 || self.decoder.max_payload_len > UBX_MAX_PAYLOAD_SIZE {
            return Err(invalid(format!(
                "max_payload_len must be between 1 and {}",
                UBX_MAX_PAYLOAD_SIZE
            )));
        }

        if self.decoder.resync_warn_threshold == 0 {
            return Err(invalid("resync_warn_threshold must be greater than 0"));
        }

        if self.decoder.resync_window_ms == 0 {
            return Err(invalid("resync_window_ms must be greater than 0"));
        }

        // Time
        self.leap_second_table()?;

        // Status
        if self.status.interval_ms < 100 || self.status.interval_ms > 60000 {
            return Err(invalid("status interval_ms must be between 100 and 60000"));
        }

        // Validation
        if !(self.validation.expected_rate_hz > 0.0 && self.validation.expected_rate_hz <= 100.0) {
            return Err(invalid("expected_rate_hz must be greater than 0 and at most 100"));
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.idle_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.logging.flush_interval_ms)
    }

    pub fn correlation_interval(&self) -> Duration {
        Duration::from_millis(self.time.correlation_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status.interval_ms)
    }

    pub fn resync_window(&self) -> Duration {
        Duration::from_millis(self.decoder.resync_window_ms)
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> GnssLoggerError {
    GnssLoggerError::Config(toml::de::Error::custom(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn create_valid_config() -> Config {
        Config::default()
    }

    fn create_ntrip_config() -> Config {
        let mut config = create_valid_config();
        config.ntrip.enabled = true;
        config.ntrip.host = "caster.example.net".to_string();
        config.ntrip.mountpoint = "BASE1".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.serial.baud_rate, 460800);
        assert!(!config.ntrip.enabled);
        assert_eq!(config.logging.file_prefix, "gps_log");
        assert_eq!(config.time.leap_seconds.len(), 18);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 115200

[ntrip]
enabled = true
host = "rtk2go.com"
mountpoint = "sheep"
username = "user@example.com"
password = "none"

[logging]
log_dir = "/tmp/gnss"

[time]
correlation_interval_ms = 10000

[[time.leap_seconds]]
effective = "2017-01-01"
seconds = 18

[validation]
expected_rate_hz = 5.0
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.ntrip.port, 2101);
        assert_eq!(config.ntrip.username.as_deref(), Some("user@example.com"));
        assert_eq!(config.time.leap_seconds.len(), 1);
        assert_eq!(config.correlation_interval(), Duration::from_secs(10));
        assert_eq!(config.validation.expected_rate_hz, 5.0);
    }

    #[test]
    fn test_shipped_default_toml_is_valid() {
        let contents = include_str!("../config/default.toml");
        assert!(Config::from_toml(contents).is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/gnss-logger.toml"),
            Err(GnssLoggerError::Io(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Config::from_toml("[serial\nport = 1"),
            Err(GnssLoggerError::Config(_))
        ));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in SUPPORTED_BAUD_RATES {
            let mut config = create_valid_config();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_idle_timeout_zero() {
        let mut config = create_valid_config();
        config.serial.idle_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_buffer_too_small() {
        let mut config = create_valid_config();
        config.serial.read_buffer_size = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ntrip_enabled_valid() {
        assert!(create_ntrip_config().validate().is_ok());
    }

    #[test]
    fn test_ntrip_enabled_without_host() {
        let mut config = create_ntrip_config();
        config.ntrip.host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ntrip_enabled_without_mountpoint() {
        let mut config = create_ntrip_config();
        config.ntrip.mountpoint = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ntrip_disabled_ignores_empty_host() {
        let mut config = create_valid_config();
        config.ntrip.enabled = false;
        config.ntrip.host = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ntrip_username_without_password() {
        let mut config = create_ntrip_config();
        config.ntrip.username = Some("user".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ntrip_credentials_together() {
        let mut config = create_ntrip_config();
        config.ntrip.username = Some("user".to_string());
        config.ntrip.password = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connect_timeout_zero() {
        let mut config = create_valid_config();
        config.ntrip.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_interval_zero() {
        let mut config = create_valid_config();
        config.ntrip.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_reconnect_below_initial() {
        let mut config = create_valid_config();
        config.ntrip.reconnect_interval_ms = 5000;
        config.ntrip.max_reconnect_interval_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_depth_zero() {
        let mut config = create_valid_config();
        config.ntrip.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_prefix_with_separator() {
        let mut config = create_valid_config();
        config.logging.file_prefix = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir() {
        let mut config = create_valid_config();
        config.logging.log_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_flush_interval_allowed() {
        let mut config = create_valid_config();
        config.logging.flush_interval_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_payload_len_bounds() {
        let mut config = create_valid_config();
        config.decoder.max_payload_len = 0;
        assert!(config.validate().is_err());

        config.decoder.max_payload_len = UBX_MAX_PAYLOAD_SIZE + 1;
        assert!(config.validate().is_err());

        config.decoder.max_payload_len = UBX_MAX_PAYLOAD_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resync_threshold_zero() {
        let mut config = create_valid_config();
        config.decoder.resync_warn_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_leap_second_entries() {
        let mut config = create_valid_config();
        let day = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        config.time.leap_seconds = vec![
            LeapSecondEntry { effective: day, seconds: 18 },
            LeapSecondEntry { effective: day, seconds: 19 },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_interval_too_low() {
        let mut config = create_valid_config();
        config.status.interval_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expected_rate_invalid() {
        for rate in [0.0, -1.0, f64::NAN, 1000.0] {
            let mut config = create_valid_config();
            config.validation.expected_rate_hz = rate;
            assert!(config.validate().is_err(), "rate {} should be rejected", rate);
        }
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyAMA4");
        assert_eq!(default_baud_rate(), 460800);
        assert_eq!(default_idle_timeout_ms(), 5000);
        assert_eq!(default_read_buffer_size(), 4096);
        assert_eq!(default_ntrip_port(), 2101);
        assert_eq!(default_connect_timeout_ms(), 10000);
        assert_eq!(default_reconnect_interval_ms(), 1000);
        assert_eq!(default_max_reconnect_interval_ms(), 30000);
        assert_eq!(default_queue_depth(), 64);
        assert_eq!(default_log_dir(), PathBuf::from("./data"));
        assert_eq!(default_file_prefix(), "gps_log");
        assert_eq!(default_flush_interval_ms(), 1000);
        assert_eq!(default_max_payload_len(), 8192);
        assert_eq!(default_resync_warn_threshold(), 50);
        assert_eq!(default_resync_window_ms(), 10000);
        assert_eq!(default_status_interval_ms(), 1000);
        assert_eq!(default_expected_rate_hz(), 10.0);
    }
}
