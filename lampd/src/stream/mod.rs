//! FFT stream client.
//!
//! Owns the TCP connection to the FFT server: config handshake, accumulating
//! frame reads under a per-read timeout, and the single-byte acknowledgement
//! that paces the server. The server keeps one frame in flight per ack, so
//! the ack must go out before any client-side processing.

pub mod codec;

use std::io;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::engine::Event;
use crate::tokio_spawn;
pub use codec::{AudioFrame, ProtocolError, StreamConfig};

/// How long to wait for the TCP connection to be accepted.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// How long to wait for the server's config message.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a single `read_frame` call may wait for data. Expiry is
/// recoverable; the next call resumes the partially-read frame.
pub const READ_TIMEOUT: Duration = Duration::from_millis(250);
/// Base delay between reconnection attempts.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);
/// Upper bound of the random extra delay added to each reconnection
/// attempt, so a fleet of lamps doesn't hammer the server in lockstep.
const RECONNECT_JITTER_MS: u64 = 250;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("server unreachable: {0}")]
    Unreachable(#[source] io::Error),
    #[error("timed out waiting for the config message")]
    HandshakeTimeout,
}

#[derive(Error, Debug)]
pub enum ReadError {
    /// No data within the read timeout. Recoverable: retry on the same
    /// connection.
    #[error("timed out waiting for frame data")]
    Timeout,
    /// The connection is gone. The caller must tear down and reconnect.
    #[error("connection lost: {0}")]
    Disconnected(#[source] io::Error),
}

pub struct StreamClient {
    stream: TcpStream,
    config: Option<StreamConfig>,
    frame_buf: Vec<u8>,
    /// Bytes of the current frame read so far. Survives a read timeout so
    /// the next call continues the accumulation.
    filled: usize,
    last_frame_at: Option<Instant>,
    last_read_duration: Duration,
    inter_frame_interval: Duration,
}

impl StreamClient {
    /// Opens the TCP connection. The config handshake is a separate step.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let addr = format!("{host}:{port}");
        let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Err(_) => {
                return Err(ConnectError::Unreachable(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {addr} timed out"),
                )))
            }
            Ok(Err(e)) => return Err(ConnectError::Unreachable(e)),
            Ok(Ok(stream)) => stream,
        };
        // acks must not sit in a Nagle buffer
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY: {e}");
        }
        Ok(Self {
            stream,
            config: None,
            frame_buf: Vec::new(),
            filled: 0,
            last_frame_at: None,
            last_read_duration: Duration::ZERO,
            inter_frame_interval: Duration::ZERO,
        })
    }

    /// Reads the server's config message within `handshake_timeout` and
    /// acknowledges it. On [`ConnectError::HandshakeTimeout`] the connection
    /// is unusable and must be closed by the caller.
    pub async fn handshake(
        &mut self,
        handshake_timeout: Duration,
    ) -> Result<StreamConfig, ConnectError> {
        let mut buf = [0_u8; codec::CONFIG_MSG_SIZE];
        match timeout(handshake_timeout, self.stream.read_exact(&mut buf)).await {
            Err(_) => return Err(ConnectError::HandshakeTimeout),
            Ok(Err(e)) => return Err(ConnectError::Unreachable(e)),
            Ok(Ok(_)) => {}
        }
        self.stream
            .write_all(&[codec::ACK])
            .await
            .map_err(ConnectError::Unreachable)?;

        let config = codec::decode_config(&buf)
            .expect("config buffer has the exact message size");
        self.frame_buf = vec![0; config.frame_byte_size()];
        self.filled = 0;
        self.config = Some(config);
        Ok(config)
    }

    pub fn config(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    /// Reads one full frame, accumulating partial reads, then sends the
    /// acknowledgement *before* returning so that caller-side processing
    /// time never delays the server's next message.
    pub async fn read_frame(&mut self, read_timeout: Duration) -> Result<AudioFrame, ReadError> {
        let Some(config) = self.config else {
            return Err(ReadError::Disconnected(io::Error::new(
                io::ErrorKind::NotConnected,
                "config handshake has not completed",
            )));
        };
        let started = Instant::now();
        let deadline = started + read_timeout;

        while self.filled < self.frame_buf.len() {
            let read = timeout(
                deadline.saturating_duration_since(Instant::now()),
                self.stream.read(&mut self.frame_buf[self.filled..]),
            )
            .await;
            match read {
                Err(_) => return Err(ReadError::Timeout),
                Ok(Ok(0)) => {
                    return Err(ReadError::Disconnected(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    )))
                }
                Ok(Ok(n)) => self.filled += n,
                Ok(Err(e)) => return Err(ReadError::Disconnected(e)),
            }
        }
        self.filled = 0;

        self.stream
            .write_all(&[codec::ACK])
            .await
            .map_err(ReadError::Disconnected)?;

        let now = Instant::now();
        self.last_read_duration = now - started;
        if let Some(last) = self.last_frame_at {
            self.inter_frame_interval = now - last;
        }
        self.last_frame_at = Some(now);

        codec::decode_frame(&self.frame_buf, config.band_count).map_err(|e| {
            ReadError::Disconnected(io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    /// Duration of the last completed `read_frame`, for jitter diagnostics.
    pub fn last_read_duration(&self) -> Duration {
        self.last_read_duration
    }

    /// Interval between the last two completed frames, for jitter
    /// diagnostics.
    pub fn inter_frame_interval(&self) -> Duration {
        self.inter_frame_interval
    }

    /// Releases the connection. Best effort: teardown errors are swallowed.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Handle to the spawned stream task.
///
/// Use [`StreamTask::shutdown`] to cancel the task and wait for its socket
/// to be released. Merely dropping the handle cancels without waiting.
pub struct StreamTask {
    kill_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamTask {
    /// Spawns the client task: connect, handshake, stream frames into
    /// `events`, reconnect with backoff on any failure, forever.
    pub fn spawn(host: String, port: u16, events: mpsc::Sender<Event>) -> Self {
        let (kill_tx, kill_rx) = oneshot::channel();
        let handle = tokio_spawn("fft-stream", run(host, port, events, kill_rx));
        Self { kill_tx, handle }
    }

    /// Cancels the task and waits until its socket is closed, so that no
    /// two stream tasks ever feed the engine at the same time.
    pub async fn shutdown(self) {
        let _ = self.kill_tx.send(());
        let _ = self.handle.await;
    }
}

enum SessionEnd {
    Killed,
    Reconnect,
}

async fn run(
    host: String,
    port: u16,
    events: mpsc::Sender<Event>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    loop {
        let connected = tokio::select! {
            _ = &mut kill_rx => return,
            connected = connect_and_handshake(&host, port) => connected,
        };
        match connected {
            Ok(client) => {
                info!(
                    "FFT stream up: {} bands at {} Hz",
                    client.config().map_or(0, |c| c.band_count),
                    client.config().map_or(0, |c| c.sample_rate),
                );
                match stream_frames(client, &events, &mut kill_rx).await {
                    SessionEnd::Killed => return,
                    SessionEnd::Reconnect => {}
                }
            }
            Err(e) => debug!("FFT server not reachable: {e}"),
        }
        let backoff = RECONNECT_DELAY
            + Duration::from_millis(rand::thread_rng().gen_range(0..RECONNECT_JITTER_MS));
        tokio::select! {
            _ = &mut kill_rx => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

async fn connect_and_handshake(host: &str, port: u16) -> Result<StreamClient, ConnectError> {
    let mut client = StreamClient::connect(host, port, CONNECT_TIMEOUT).await?;
    match client.handshake(HANDSHAKE_TIMEOUT).await {
        Ok(_) => Ok(client),
        Err(e) => {
            client.close().await;
            Err(e)
        }
    }
}

async fn stream_frames(
    mut client: StreamClient,
    events: &mpsc::Sender<Event>,
    kill_rx: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let Some(&config) = client.config() else {
        client.close().await;
        return SessionEnd::Reconnect;
    };
    tokio::select! {
        _ = &mut *kill_rx => {
            client.close().await;
            return SessionEnd::Killed;
        }
        sent = events.send(Event::StreamConnected(config)) => {
            if sent.is_err() {
                // engine is gone, nothing left to feed
                client.close().await;
                return SessionEnd::Killed;
            }
        }
    }
    loop {
        tokio::select! {
            _ = &mut *kill_rx => {
                client.close().await;
                return SessionEnd::Killed;
            }
            frame = client.read_frame(READ_TIMEOUT) => match frame {
                Ok(frame) => {
                    // the producer never blocks on a slow engine; overflow
                    // drops the newest frame
                    if events.try_send(Event::Audio(frame)).is_err() {
                        trace!("engine queue full, dropping frame");
                    }
                }
                Err(ReadError::Timeout) => {
                    trace!(
                        "frame read timed out (last read {:?}, interval {:?})",
                        client.last_read_duration(),
                        client.inter_frame_interval(),
                    );
                }
                Err(ReadError::Disconnected(e)) => {
                    warn!("FFT stream lost: {e}");
                    client.close().await;
                    return SessionEnd::Reconnect;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    async fn listen() -> (TcpListener, String, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // bind and drop to get a port with nothing listening
        let (listener, host, port) = listen().await;
        drop(listener);
        let result = StreamClient::connect(&host, port, CONNECT_TIMEOUT).await;
        assert!(matches!(result, Err(ConnectError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_handshake_and_ack() {
        let (listener, host, port) = listen().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(&codec::encode_config(&StreamConfig {
                    sample_rate: 20,
                    band_count: 9,
                }))
                .await
                .unwrap();
            let mut ack = [0_u8; 1];
            socket.read_exact(&mut ack).await.unwrap();
            ack[0]
        });

        let mut client = StreamClient::connect(&host, port, CONNECT_TIMEOUT)
            .await
            .unwrap();
        let config = client.handshake(HANDSHAKE_TIMEOUT).await.unwrap();
        assert_eq!(config.sample_rate, 20);
        assert_eq!(config.band_count, 9);
        assert_eq!(server.await.unwrap(), codec::ACK);
        client.close().await;
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (listener, host, port) = listen().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // never send a config message
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(socket);
        });

        let mut client = StreamClient::connect(&host, port, CONNECT_TIMEOUT)
            .await
            .unwrap();
        let result = client.handshake(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ConnectError::HandshakeTimeout)));
        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_accumulates_partial_reads() {
        let (listener, host, port) = listen().await;
        let frame = AudioFrame(vec![-27.0, -13.5, 0.0]);
        let bytes = codec::encode_frame(&frame);
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[3, 3]).await.unwrap();
            let mut ack = [0_u8; 1];
            socket.read_exact(&mut ack).await.unwrap();
            // split the frame to force accumulation on the client
            socket.write_all(&bytes[..5]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&bytes[5..]).await.unwrap();
            socket.read_exact(&mut ack).await.unwrap();
            ack[0]
        });

        let mut client = StreamClient::connect(&host, port, CONNECT_TIMEOUT)
            .await
            .unwrap();
        client.handshake(HANDSHAKE_TIMEOUT).await.unwrap();
        let read = client.read_frame(READ_TIMEOUT).await.unwrap();
        assert_eq!(read, frame);
        assert_eq!(server.await.unwrap(), codec::ACK);
        client.close().await;
    }

    #[tokio::test]
    async fn test_read_timeout_is_recoverable() {
        let (listener, host, port) = listen().await;
        let frame_bytes = codec::encode_frame(&AudioFrame(vec![-3.0, -6.0, -9.0]));
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[20, 3]).await.unwrap();
            let mut ack = [0_u8; 1];
            socket.read_exact(&mut ack).await.unwrap();
            // stay silent long enough for several read timeouts, then send
            tokio::time::sleep(Duration::from_millis(120)).await;
            socket.write_all(&frame_bytes).await.unwrap();
            socket.read_exact(&mut ack).await.unwrap();
        });

        let mut client = StreamClient::connect(&host, port, CONNECT_TIMEOUT)
            .await
            .unwrap();
        client.handshake(HANDSHAKE_TIMEOUT).await.unwrap();
        let short = Duration::from_millis(30);
        for _ in 0..3 {
            assert!(matches!(
                client.read_frame(short).await,
                Err(ReadError::Timeout)
            ));
        }
        // connection is still usable after consecutive timeouts
        let frame = client.read_frame(Duration::from_millis(500)).await.unwrap();
        assert_eq!(frame.bands().len(), 3);
        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_is_disconnect() {
        let (listener, host, port) = listen().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[20, 3]).await.unwrap();
            let mut ack = [0_u8; 1];
            socket.read_exact(&mut ack).await.unwrap();
            drop(socket);
        });

        let mut client = StreamClient::connect(&host, port, CONNECT_TIMEOUT)
            .await
            .unwrap();
        client.handshake(HANDSHAKE_TIMEOUT).await.unwrap();
        server.await.unwrap();
        let result = client.read_frame(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(ReadError::Disconnected(_))));
        client.close().await;
    }
}
