//! Event relay transport (§4.E).
//!
//! The relay contract is a pub/sub "SUB socket" receiving opaque,
//! zlib-compressed JSON frames. No ZeroMQ binding is present anywhere in the
//! retrieval pack this crate was grounded on, so the production transport
//! dials over a websocket (`tokio-tungstenite`) instead — the closest
//! idiomatic pub/sub-over-TCP primitive available — behind an `EventTransport`
//! trait that lets tests supply a canned frame sequence, the same way the
//! teacher's `FileSystem` trait decouples collection logic from `/proc`.

use std::io::Read;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::collector::events::Envelope;

pub const STATUS_IDLE: u8 = 0;
pub const STATUS_RUNNING: u8 = 1;
pub const STATUS_CLOSING: u8 = 2;

/// Shared listener state machine status (§4.E): `Idle(0) -> Dialing/Subscribed/Recv(1)
/// -> Closed(2)`. `Idle -> Dialing` is a single CAS; `Closed` is observed once
/// the in-flight receive completes after a close was requested.
#[derive(Default)]
pub struct ListenerStatus(AtomicU8);

impl ListenerStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(STATUS_IDLE))
    }

    /// Attempts the `Idle -> Dialing` transition. Returns `true` if this call won the race.
    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(STATUS_IDLE, STATUS_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn request_close(&self) {
        self.0.store(STATUS_CLOSING, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.0.load(Ordering::SeqCst) == STATUS_CLOSING
    }
}

#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Recv(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "connect failed: {msg}"),
            TransportError::Recv(msg) => write!(f, "receive failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A source of opaque, zlib-compressed event frames.
#[async_trait]
pub trait EventTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    /// Blocks until the next frame arrives, or returns an error (triggering a
    /// reconnect-with-backoff in the owner task's run loop).
    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Production transport: a websocket client dialing the relay URL and
/// subscribing to the empty topic.
pub struct WebSocketTransport {
    url: String,
    stream: Option<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), stream: None }
    }
}

#[async_trait]
impl EventTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let (mut stream, _resp) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        // Subscribe to the empty topic, matching a SUB socket's subscribe-all semantics.
        stream
            .send(Message::Text(String::new()))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::Recv("not connected".to_string()))?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::Recv("relay closed the connection".to_string()));
                }
                Some(Ok(_)) => continue, // ping/pong/text control frames
                Some(Err(e)) => return Err(TransportError::Recv(e.to_string())),
            }
        }
    }
}

/// Decompresses a zlib frame and parses it as the §4.E JSON envelope.
pub fn decode_frame(compressed: &[u8]) -> Result<Envelope, String> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = String::new();
    decoder
        .read_to_string(&mut decompressed)
        .map_err(|e| format!("zlib decompression failed: {e}"))?;
    serde_json::from_str(&decompressed).map_err(|e| format!("envelope parse failed: {e}"))
}

/// In-memory transport for tests: yields a fixed sequence of frames, then errors.
pub struct ScriptedTransport {
    frames: std::collections::VecDeque<Vec<u8>>,
    connected: bool,
}

impl ScriptedTransport {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames: frames.into(), connected: false }
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::Recv("not connected".to_string()));
        }
        self.frames
            .pop_front()
            .ok_or_else(|| TransportError::Recv("script exhausted".to_string()))
    }
}

/// zlib-compresses a JSON value, for building test fixtures that mirror real relay frames.
pub fn compress_for_test(json: &serde_json::Value) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.to_string().as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_status_cas_wins_once() {
        let status = ListenerStatus::new();
        assert!(status.try_start());
        assert!(!status.try_start());
    }

    #[test]
    fn decode_frame_round_trips() {
        let envelope = serde_json::json!({
            "header": {"softwareName": "test"},
            "message": {"event": "FSDJump"},
        });
        let compressed = compress_for_test(&envelope);
        let decoded = decode_frame(&compressed).unwrap();
        assert_eq!(decoded.message.get("event").unwrap(), "FSDJump");
    }

    #[tokio::test]
    async fn scripted_transport_yields_frames_then_errors() {
        let mut transport = ScriptedTransport::new(vec![b"a".to_vec(), b"b".to_vec()]);
        transport.connect().await.unwrap();
        assert_eq!(transport.recv_frame().await.unwrap(), b"a".to_vec());
        assert_eq!(transport.recv_frame().await.unwrap(), b"b".to_vec());
        assert!(transport.recv_frame().await.is_err());
    }
}
