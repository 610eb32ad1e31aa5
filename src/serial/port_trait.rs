//! Trait abstraction for the receiver's outbound direction, so the relay
//! writer can be tested without hardware

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write side of the receiver channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiverPort: Send {
    /// Write all data to the receiver
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Adapter from any async writer (the serial write half in production)
pub struct ReceiverWriter<W> {
    inner: W,
}

impl<W> ReceiverWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> ReceiverPort for ReceiverWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}
