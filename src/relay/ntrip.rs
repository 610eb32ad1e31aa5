//! NTRIP v1 client handshake
//!
//! ```text
//! GET /<mountpoint> HTTP/1.0
//! User-Agent: NTRIP gnss-logger/<version>
//! Authorization: Basic <base64(user:password)>     (optional)
//! <blank line>
//! ```
//!
//! Casters answer `ICY 200 OK` (v1) or an HTTP status line followed by
//! headers. Everything after the response header is correction data.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::NtripConfig;
use crate::error::{GnssLoggerError, Result};

/// Largest response header accepted before giving up on the caster
pub const MAX_RESPONSE_HEADER: usize = 4096;

/// Connection parameters for one correction source
#[derive(Clone, PartialEq, Eq)]
pub struct NtripSettings {
    pub host: String,
    pub port: u16,
    pub mountpoint: String,
    pub credentials: Option<(String, String)>,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
}

impl std::fmt::Debug for NtripSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtripSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mountpoint", &self.mountpoint)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl NtripSettings {
    /// Settings for an enabled `[ntrip]` section, `None` in no-correction mode
    pub fn from_config(config: &NtripConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Some(Self {
            host: config.host.clone(),
            port: config.port,
            mountpoint: config.mountpoint.trim_start_matches('/').to_string(),
            credentials,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            max_reconnect_interval: Duration::from_millis(config.max_reconnect_interval_ms),
        })
    }

    /// `host:port/mountpoint`, for log lines
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.mountpoint)
    }
}

/// Build the request sent right after the TCP connection opens
pub fn build_request(settings: &NtripSettings) -> String {
    let mut request = format!(
        "GET /{} HTTP/1.0\r\nUser-Agent: NTRIP gnss-logger/{}\r\n",
        settings.mountpoint,
        env!("CARGO_PKG_VERSION")
    );

    if let Some((user, password)) = &settings.credentials {
        let token = STANDARD.encode(format!("{}:{}", user, password));
        request.push_str(&format!("Authorization: Basic {}\r\n", token));
    }

    request.push_str("\r\n");
    request
}

/// Check the caster's status line
///
/// # Errors
///
/// Returns a transport error unless the caster accepted the mountpoint
pub fn check_status_line(status: &str) -> Result<()> {
    if status.starts_with("SOURCETABLE") {
        return Err(GnssLoggerError::Transport(
            "mountpoint not found, caster returned its source table".to_string(),
        ));
    }

    if !status.contains("200 OK") {
        return Err(GnssLoggerError::Transport(format!(
            "NTRIP caster refused connection: {}",
            status.trim()
        )));
    }

    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Line ending that closes a v1 caster's optional blank line
const BLANK_LINE: &[u8] = b"\r\n";

/// Length of the response header in `buf` once it is complete, and whether
/// an optional blank line may still follow it
///
/// v1 casters may start streaming right after `ICY 200 OK\r\n`, so for them
/// the header ends with the status line and a blank line is stripped from
/// the start of the body if one shows up.
fn header_len(buf: &[u8]) -> Option<(usize, bool)> {
    let line_end = find(buf, b"\r\n")?;

    if buf.starts_with(b"ICY") {
        return Some((line_end + 2, true));
    }

    find(buf, b"\r\n\r\n").map(|i| (i + 4, false))
}

/// Correction data that follows the caster's response header
#[derive(Debug, Default)]
pub struct ResponseBody {
    /// Bytes that arrived in the same reads as the header
    pub leftover: Bytes,
    /// Bytes of the optional blank line matched so far, while it may still come
    blank_line: Option<usize>,
}

impl ResponseBody {
    fn new(rest: Bytes, blank_line_allowed: bool) -> Self {
        let mut body = Self {
            leftover: Bytes::new(),
            blank_line: blank_line_allowed.then_some(0),
        };
        body.leftover = body.strip_blank_line(rest);
        body
    }

    /// Drop the optional blank line from the start of the body
    ///
    /// The blank line may arrive in a later segment than the status line,
    /// or be split across segments. Only the first body bytes are examined.
    pub fn strip_blank_line(&mut self, mut chunk: Bytes) -> Bytes {
        while let Some(matched) = self.blank_line {
            let Some(&next) = chunk.first() else { break };

            if next == BLANK_LINE[matched] {
                chunk = chunk.slice(1..);
                self.blank_line = (matched + 1 < BLANK_LINE.len()).then_some(matched + 1);
            } else {
                self.blank_line = None;
                if matched > 0 {
                    // a lone CR was correction data after all
                    let mut restored = BytesMut::with_capacity(matched + chunk.len());
                    restored.extend_from_slice(&BLANK_LINE[..matched]);
                    restored.extend_from_slice(&chunk);
                    chunk = restored.freeze();
                }
            }
        }
        chunk
    }
}

/// Read and check the caster response
///
/// # Returns
///
/// * `Result<ResponseBody>` - Correction bytes that arrived in the same reads
///   as the header, plus the state needed to clean up later reads
pub async fn read_response<R>(reader: &mut R) -> Result<ResponseBody>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some((len, blank_line_allowed)) = header_len(&buf) {
            let header = buf.split_to(len);
            let text = String::from_utf8_lossy(&header);
            let status = text.lines().next().unwrap_or_default();
            debug!("NTRIP response: {}", status);

            check_status_line(status)?;
            return Ok(ResponseBody::new(buf.freeze(), blank_line_allowed));
        }

        if buf.len() >= MAX_RESPONSE_HEADER {
            return Err(GnssLoggerError::Transport(format!(
                "NTRIP response header exceeds {} bytes",
                MAX_RESPONSE_HEADER
            )));
        }

        let n = reader
            .read_buf(&mut buf)
            .await
            .map_err(|e| GnssLoggerError::Transport(format!("Failed to read NTRIP response: {}", e)))?;

        if n == 0 {
            return Err(GnssLoggerError::Transport(
                "NTRIP caster closed the connection during handshake".to_string(),
            ));
        }
    }
}

/// Open a TCP connection and complete the handshake within the connect timeout
///
/// # Returns
///
/// * `Result<(TcpStream, ResponseBody)>` - The stream plus any correction bytes already received
///
/// # Errors
///
/// Returns a transport error on connect failure, refusal or timeout
pub async fn connect(settings: &NtripSettings) -> Result<(TcpStream, ResponseBody)> {
    let attempt = async {
        let mut stream = TcpStream::connect((settings.host.as_str(), settings.port))
            .await
            .map_err(|e| {
                GnssLoggerError::Transport(format!(
                    "Failed to connect to {}:{}: {}",
                    settings.host, settings.port, e
                ))
            })?;

        stream
            .write_all(build_request(settings).as_bytes())
            .await
            .map_err(|e| GnssLoggerError::Transport(format!("Failed to send NTRIP request: {}", e)))?;

        let body = read_response(&mut stream).await?;
        Ok::<_, GnssLoggerError>((stream, body))
    };

    tokio::time::timeout(settings.connect_timeout, attempt)
        .await
        .map_err(|_| {
            GnssLoggerError::Transport(format!(
                "NTRIP connection to {} timed out after {:?}",
                settings.display_target(),
                settings.connect_timeout
            ))
        })?
}
