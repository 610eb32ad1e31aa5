mod common;

use gnss_logger::config::Config;
use gnss_logger::runtime::{run_with_receiver, SessionSummary};
use gnss_logger::serial::ReceiverWriter;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use common::*;

fn config_in(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.logging.log_dir = dir.to_path_buf();
    config.status.interval_ms = 100;
    config
}

fn with_caster(mut config: Config, port: u16) -> Config {
    config.ntrip.enabled = true;
    config.ntrip.host = "127.0.0.1".to_string();
    config.ntrip.port = port;
    config.ntrip.mountpoint = "TEST00".to_string();
    config.ntrip.connect_timeout_ms = 2000;
    config
}

/// Start a session over an in-memory receiver; returns the device end
fn start(config: Config) -> (DuplexStream, oneshot::Sender<()>, JoinHandle<gnss_logger::error::Result<SessionSummary>>) {
    let (device, host) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(host);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let session = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.await;
        };
        run_with_receiver(&config, reader, ReceiverWriter::new(writer), shutdown).await
    });

    (device, stop_tx, session)
}

/// Caster that accepts one client, answers the handshake, sends `corrections`
/// and then keeps the connection open without sending anything else
async fn caster(corrections: &'static [u8]) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 512];
        let _ = socket.read(&mut request).await.unwrap();

        socket.write_all(b"ICY 200 OK\r\n\r\n").await.unwrap();
        socket.write_all(corrections).await.unwrap();

        // hold the connection until the client hangs up
        let mut sink = [0u8; 64];
        while let Ok(n) = socket.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    });

    (port, handle)
}

#[tokio::test]
async fn test_logging_without_corrections() {
    let dir = tempfile::tempdir().unwrap();
    let (mut device, _stop, session) = start(config_in(dir.path()));

    let stream = concat(&ten_second_session(true));
    device.write_all(&stream).await.unwrap();
    drop(device);

    let summary = timeout(Duration::from_secs(5), session).await.unwrap().unwrap().unwrap();

    assert_eq!(summary.totals.frames, 155);
    assert_eq!(summary.totals.records, 50);
    assert!(!summary.counters.relay_enabled);
    assert_eq!(summary.counters.relay_bytes, 0);
    assert_eq!(std::fs::read(&summary.paths.raw).unwrap(), stream);
    assert!(summary.to_string().contains("Messages: 155 ("));
    assert!(summary.elapsed > Duration::ZERO);
}

#[tokio::test]
async fn test_silent_caster_leaves_logging_unaffected() {
    let dir = tempfile::tempdir().unwrap();
    let (port, caster) = caster(b"").await;
    let (mut device, _stop, session) = start(with_caster(config_in(dir.path()), port));

    let stream = concat(&hundred_frames());
    for chunk in stream.chunks(700) {
        device.write_all(chunk).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(device);

    let summary = timeout(Duration::from_secs(5), session).await.unwrap().unwrap().unwrap();

    assert_eq!(summary.totals.frames, 100);
    assert!(summary.counters.relay_enabled);
    assert_eq!(summary.counters.relay_bytes, 0);
    assert_eq!(summary.counters.relay_chunks, 0);
    assert_eq!(std::fs::read(&summary.paths.raw).unwrap(), stream);

    // the relay hung up on shutdown
    timeout(Duration::from_secs(2), caster).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_corrections_reach_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let (port, caster) = caster(b"\xD3\x00\x13RTCM-CORRECTIONS").await;
    let (mut device, stop, session) = start(with_caster(config_in(dir.path()), port));

    let mut received = [0u8; 19];
    timeout(Duration::from_secs(5), device.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&received, b"\xD3\x00\x13RTCM-CORRECTIONS");

    let frame = sfrbx(3);
    device.write_all(&frame).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    stop.send(()).unwrap();
    let summary = timeout(Duration::from_secs(5), session).await.unwrap().unwrap().unwrap();

    assert_eq!(summary.totals.frames, 1);
    assert_eq!(summary.counters.relay_bytes, 19);
    assert_eq!(summary.counters.relay_chunks, 1);
    assert_eq!(std::fs::read(&summary.paths.raw).unwrap(), frame);

    timeout(Duration::from_secs(2), caster).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unreachable_caster_does_not_stop_logging() {
    let dir = tempfile::tempdir().unwrap();

    // bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = with_caster(config_in(dir.path()), port);
    config.ntrip.reconnect_interval_ms = 20;
    config.ntrip.max_reconnect_interval_ms = 50;

    let (mut device, _stop, session) = start(config);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stream = concat(&ten_second_session(true));
    device.write_all(&stream).await.unwrap();
    drop(device);

    let summary = timeout(Duration::from_secs(5), session).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.totals.frames, 155);
    assert!(!summary.counters.relay_connected);
    assert_eq!(summary.counters.relay_bytes, 0);
}
