use bytes::Bytes;
use tokio::sync::watch;
use crate::Result;

mod config;
mod readiness;
mod tcp;

pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use readiness::{Readiness, ReadinessSignal};
pub use tcp::*;

/// Session transport a publish stream writes to.
///
/// Readiness is observed through a `watch` channel carrying a flip counter,
/// so a stream that wakes up after a disconnect/reconnect burst still sees
/// both flips. `send` is only attempted while the stream is publishing and
/// must not wait on the network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribe to the connected flag
    fn readiness(&self) -> watch::Receiver<Readiness>;

    /// Check if currently connected
    fn is_connected(&self) -> bool {
        self.readiness().borrow().connected
    }

    /// Hand one chunk to the transport
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Hand over chunks that belong together.
    ///
    /// Transports with a bounded queue should accept all of them or none;
    /// the default sends them one by one.
    async fn send_all(&self, parts: Vec<Bytes>) -> Result<()> {
        for part in parts {
            self.send(part).await?;
        }
        Ok(())
    }
}
