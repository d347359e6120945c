use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use url::Url;
use crate::mixer::Mixer;
use crate::muxer::Muxer;
use crate::stream::PublishStream;
use crate::transport::{ConnectionConfig, Readiness, ReadinessSignal, Transport};
use crate::{Error, Result};

/// Raw TCP session to an ingest endpoint.
///
/// `connect` flips readiness to true; peer close, a write error or
/// [`TcpConnection::close`] flips it back. Inbound bytes are read and
/// discarded so a closed peer is noticed promptly.
pub struct TcpConnection {
    /// Connection configuration
    config: Arc<ConnectionConfig>,

    /// Connected flag observed by streams
    connected: ReadinessSignal,

    /// Incremented on every connect so stale tasks can't tear down a newer session
    generation: AtomicU64,

    /// Active session, if any
    session: Mutex<Option<Session>>,
}

struct Session {
    generation: u64,
    peer: Option<SocketAddr>,
    outgoing: mpsc::Sender<Bytes>,
    tasks: Vec<JoinHandle<()>>,
}

impl TcpConnection {
    /// Create a disconnected connection with default config
    pub fn new() -> Arc<Self> {
        TcpConnection::build(ConnectionConfig::default())
    }

    /// Create a disconnected connection, rejecting an invalid config
    pub fn with_config(config: ConnectionConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(TcpConnection::build(config))
    }

    fn build(config: ConnectionConfig) -> Arc<Self> {
        Arc::new(TcpConnection {
            config: Arc::new(config),
            connected: ReadinessSignal::new(false),
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect to `url` (`tcp://host:port` or `rtmp://host[:port]/...`)
    pub async fn connect(self: &Arc<Self>, url: &str) -> Result<()> {
        if self.is_connected() {
            return Err(Error::invalid_state("Already connected"));
        }

        let addr = resolve_address(url, self.config.default_port)?;

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::connection(format!("Failed to connect to {}: {}", addr, e))),
            Err(_) => return Err(Error::timeout(format!("Connecting to {}", addr))),
        };

        stream.set_nodelay(self.config.nodelay)?;
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outgoing, queue) = mpsc::channel(self.config.send_queue_capacity);

        // The session is current before its tasks run, so a peer that closes
        // right away is torn down by them instead of being missed
        let previous = self.lock_session().replace(Session {
            generation,
            peer,
            outgoing,
            tasks: Vec::new(),
        });
        if let Some(previous) = previous {
            previous.shutdown();
        }
        self.connected.set(true);

        let weak = Arc::downgrade(self);
        let tasks = vec![
            tokio::spawn(write_loop(
                writer,
                queue,
                self.config.write_timeout,
                weak.clone(),
                generation,
            )),
            tokio::spawn(read_loop(reader, weak, generation)),
        ];

        match self.lock_session().as_mut() {
            Some(session) if session.generation == generation => session.tasks = tasks,
            _ => {
                debug!("Session {} ended before its tasks were registered", generation);
                for task in tasks {
                    task.abort();
                }
            }
        }

        info!("Connected to {}", addr);
        Ok(())
    }

    /// Drop the session. Streams see readiness flip to false.
    pub fn close(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            session.shutdown();
        }
        if self.connected.set(false) {
            info!("Connection closed");
        }
    }

    /// Remote address of the active session
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock_session().as_ref().and_then(|s| s.peer)
    }

    /// Create a publish stream bound to this connection
    pub fn create_stream(self: &Arc<Self>, mixer: Arc<dyn Mixer>, muxer: Box<dyn Muxer>) -> PublishStream {
        PublishStream::new(self, mixer, muxer)
    }

    /// Tear down the session started as `generation`, if it is still current
    fn disconnect(&self, generation: u64) {
        let session = {
            let mut current = self.lock_session();
            match current.as_ref() {
                Some(session) if session.generation == generation => current.take(),
                _ => return,
            }
        };

        if let Some(session) = session {
            session.shutdown();
        }
        if self.connected.set(false) {
            info!("Disconnected from peer");
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn outgoing(&self) -> Result<mpsc::Sender<Bytes>> {
        self.lock_session()
            .as_ref()
            .map(|s| s.outgoing.clone())
            .ok_or_else(|| Error::connection("Not connected"))
    }
}

impl Session {
    fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.shutdown();
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpConnection {
    fn readiness(&self) -> watch::Receiver<Readiness> {
        self.connected.subscribe()
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.outgoing()?.try_send(data).map_err(queue_error)
    }

    async fn send_all(&self, parts: Vec<Bytes>) -> Result<()> {
        if parts.is_empty() {
            return Ok(());
        }

        let outgoing = self.outgoing()?;
        let permits = outgoing.try_reserve_many(parts.len()).map_err(queue_error)?;
        for (permit, part) in permits.zip(parts) {
            permit.send(part);
        }
        Ok(())
    }
}

fn queue_error<T>(e: mpsc::error::TrySendError<T>) -> Error {
    match e {
        mpsc::error::TrySendError::Full(_) => Error::connection("Send queue full"),
        mpsc::error::TrySendError::Closed(_) => Error::closed("Socket writer stopped"),
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
    connection: Weak<TcpConnection>,
    generation: u64,
) {
    while let Some(data) = queue.recv().await {
        match timeout(write_timeout, writer.write_all(&data)).await {
            Ok(Ok(())) => trace!("Wrote {} bytes", data.len()),
            Ok(Err(e)) => {
                warn!("Socket write failed: {}", e);
                break;
            }
            Err(_) => {
                warn!("Socket write timed out after {:?}", write_timeout);
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    if let Some(connection) = connection.upgrade() {
        connection.disconnect(generation);
    }
}

async fn read_loop(mut reader: OwnedReadHalf, connection: Weak<TcpConnection>, generation: u64) {
    let mut buf = vec![0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Peer closed the connection");
                break;
            }
            Ok(n) => trace!("Discarding {} inbound bytes", n),
            Err(e) => {
                warn!("Socket read failed: {}", e);
                break;
            }
        }
    }

    if let Some(connection) = connection.upgrade() {
        connection.disconnect(generation);
    }
}

/// Resolve `url` to a `host:port` string
pub fn resolve_address(url: &str, default_port: u16) -> Result<String> {
    let url = Url::parse(url)
        .map_err(|e| Error::config(format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "tcp" | "rtmp" => {}
        scheme => return Err(Error::config(format!("Unsupported scheme: {}", scheme))),
    }

    let host = url.host_str()
        .ok_or_else(|| Error::config("Missing host in URL"))?;
    let port = url.port().unwrap_or(default_port);

    if host.contains(':') {
        Ok(format!("[{}]:{}", host.trim_matches(|c| c == '[' || c == ']'), port))
    } else {
        Ok(format!("{}:{}", host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_resolve_address() {
        assert_eq!(resolve_address("rtmp://localhost/live", 1935).unwrap(), "localhost:1935");
        assert_eq!(resolve_address("tcp://10.0.0.1:9000", 1935).unwrap(), "10.0.0.1:9000");
        assert_eq!(resolve_address("tcp://[::1]:9000", 1935).unwrap(), "[::1]:9000");
    }

    #[test]
    fn test_resolve_address_rejects() {
        assert!(resolve_address("http://localhost", 1935).is_err());
        assert!(resolve_address("not a url", 1935).is_err());
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let connection = TcpConnection::new();
        assert!(!connection.is_connected());

        let result = connection.send(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_and_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connection = TcpConnection::new();
        let mut readiness = connection.readiness();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        connection.connect(&format!("tcp://127.0.0.1:{}", port)).await.unwrap();
        let peer = accept.await.unwrap();

        assert!(connection.is_connected());
        assert!(connection.peer_addr().is_some());
        readiness.changed().await.unwrap();
        assert!(readiness.borrow_and_update().connected);

        drop(peer);
        timeout(Duration::from_secs(5), readiness.changed()).await.unwrap().unwrap();
        let current = *readiness.borrow();
        assert!(!current.connected);
        assert_eq!(current.epoch, 2);
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = ConnectionConfig {
            send_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(TcpConnection::with_config(config), Err(Error::Configuration(_))));
        assert!(TcpConnection::with_config(ConnectionConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_peer_closing_at_once_flips_readiness_back() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept and hang up immediately
        let accept = tokio::spawn(async move { drop(listener.accept().await.unwrap().0) });

        let connection = TcpConnection::new();
        let mut readiness = connection.readiness();
        connection.connect(&format!("tcp://127.0.0.1:{}", port)).await.unwrap();
        accept.await.unwrap();

        timeout(Duration::from_secs(5), readiness.wait_for(|r| !r.connected && r.epoch == 2))
            .await
            .unwrap()
            .unwrap();
        assert!(!connection.is_connected());
        assert!(connection.peer_addr().is_none());
    }

    #[tokio::test]
    async fn test_send_all_is_all_or_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let config = ConnectionConfig::builder().send_queue_capacity(2).build().unwrap();
        let connection = TcpConnection::with_config(config).unwrap();
        connection.connect(&format!("tcp://127.0.0.1:{}", port)).await.unwrap();
        let _peer = accept.await.unwrap();

        let parts = vec![
            Bytes::from_static(b"header"),
            Bytes::from_static(b"payload"),
            Bytes::from_static(b"trailer"),
        ];
        let result = connection.send_all(parts).await;
        assert!(matches!(result, Err(Error::Connection(_))));

        let parts = vec![Bytes::from_static(b"header"), Bytes::from_static(b"payload")];
        assert!(connection.send_all(parts).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_flips_readiness() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let connection = TcpConnection::new();
        connection.connect(&format!("tcp://127.0.0.1:{}", port)).await.unwrap();
        let _peer = accept.await.unwrap();

        assert!(connection.connect(&format!("tcp://127.0.0.1:{}", port)).await.is_err());

        connection.close();
        assert!(!connection.is_connected());
        assert!(connection.send(Bytes::from_static(b"x")).await.is_err());

        // Closing twice is harmless
        connection.close();
    }
}
