//! Transport seam between the connection manager and the network.
//!
//! A [`Connector`] opens one transport session and hands back a
//! [`TransportHandle`]: an outbound frame sender plus an inbound event
//! receiver. The connection manager only ever talks to these two channels,
//! so the real WebSocket ([`WsConnector`]) and the in-memory test double
//! ([`MemoryConnector`]) are interchangeable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use mp_core::constants::close_code;
use mp_core::error::{MpError, MpResult};

use crate::envelope::Envelope;

/// Close code reported when the peer closed without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// A frame the client wants to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound text frame.
    Text(String),
    /// A transport failure.
    Error(String),
    /// The transport is gone. Terminal.
    Closed { code: u16, reason: String },
}

/// Both halves of one open transport session.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<OutboundFrame>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}

/// Opens transport sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Perform the handshake against `url`.
    ///
    /// An `Err` is a handshake failure; the connection manager reports it
    /// as an `error` event followed by an abnormal close.
    async fn open(&self, url: &Url) -> MpResult<TransportHandle>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> MpResult<TransportHandle> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| MpError::Socket(format!("handshake failed: {e}")))?;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

        tokio::spawn(async move {
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    frame = out_rx.recv() => {
                        match frame {
                            Some(OutboundFrame::Text(text)) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                                    let _ = in_tx.send(TransportEvent::Closed {
                                        code: close_code::ABNORMAL,
                                        reason: String::new(),
                                    });
                                    break;
                                }
                            }
                            Some(OutboundFrame::Close { code, reason }) => {
                                let frame = CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: reason.clone().into(),
                                };
                                let _ = write.send(Message::Close(Some(frame))).await;
                                let _ = in_tx.send(TransportEvent::Closed { code, reason });
                                break;
                            }
                            None => {
                                // Every sender dropped: the connection is gone.
                                let frame = CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "".into(),
                                };
                                let _ = write.send(Message::Close(Some(frame))).await;
                                break;
                            }
                        }
                    }

                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = in_tx.send(TransportEvent::Text(text.to_string()));
                            }
                            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                                Ok(text) => {
                                    let _ = in_tx.send(TransportEvent::Text(text));
                                }
                                Err(_) => warn!("dropping non-utf8 binary frame ({} bytes)", data.len()),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                let (code, reason) = match frame {
                                    Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                                    None => (NO_STATUS_RECEIVED, String::new()),
                                };
                                let _ = in_tx.send(TransportEvent::Closed { code, reason });
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/pong are answered by tungstenite.
                            }
                            Some(Err(e)) => {
                                let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                                let _ = in_tx.send(TransportEvent::Closed {
                                    code: close_code::ABNORMAL,
                                    reason: String::new(),
                                });
                                break;
                            }
                            None => {
                                let _ = in_tx.send(TransportEvent::Closed {
                                    code: close_code::ABNORMAL,
                                    reason: String::new(),
                                });
                                break;
                            }
                        }
                    }
                }
            }

            debug!("websocket pump finished");
        });

        Ok(TransportHandle::new(out_tx, in_rx))
    }
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

struct MemoryState {
    refuse: AtomicBool,
    handshake_delay: Mutex<Duration>,
    attempted: Mutex<Vec<Url>>,
    peer_tx: mpsc::UnboundedSender<MemoryPeer>,
    peer_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

/// In-process connector. Every successful `open` yields a [`MemoryPeer`]
/// playing the server side of that session.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<MemoryState>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(MemoryState {
                refuse: AtomicBool::new(false),
                handshake_delay: Mutex::new(Duration::ZERO),
                attempted: Mutex::new(Vec::new()),
                peer_tx,
                peer_rx: tokio::sync::Mutex::new(peer_rx),
            }),
        }
    }

    /// Make subsequent handshakes fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Delay every handshake by `delay` before it resolves.
    pub fn set_handshake_delay(&self, delay: Duration) {
        *self.state.handshake_delay.lock() = delay;
    }

    /// Number of handshakes attempted so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempted.lock().len()
    }

    pub fn attempted_urls(&self) -> Vec<Url> {
        self.state.attempted.lock().clone()
    }

    /// Wait for the next accepted session.
    pub async fn next_peer(&self) -> Option<MemoryPeer> {
        self.state.peer_rx.lock().await.recv().await
    }

    /// The next accepted session, if one is already waiting.
    pub fn try_next_peer(&self) -> Option<MemoryPeer> {
        self.state.peer_rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &Url) -> MpResult<TransportHandle> {
        self.state.attempted.lock().push(url.clone());

        let delay = *self.state.handshake_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(MpError::Socket("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.clone(),
            to_client: in_tx,
            from_client: out_rx,
            closed: false,
        };
        self.state
            .peer_tx
            .send(peer)
            .map_err(|_| MpError::Socket("memory connector closed".into()))?;

        Ok(TransportHandle::new(out_tx, in_rx))
    }
}

/// Server side of one in-memory session.
///
/// Dropping the peer without calling [`MemoryPeer::close`] looks like the
/// network going away: the client sees an abnormal close.
pub struct MemoryPeer {
    url: Url,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<OutboundFrame>,
    closed: bool,
}

impl MemoryPeer {
    /// The URL the client connected to, query string included.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Text(text.into()));
    }

    pub fn send_envelope(&self, envelope: &Envelope) {
        if let Ok(text) = envelope.encode() {
            self.send_text(text);
        }
    }

    /// Report a transport error without closing.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(message.into()));
    }

    /// Close the session from the server side.
    pub fn close(mut self, code: u16, reason: impl Into<String>) {
        self.closed = true;
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    /// Wait for the next frame the client sent.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.from_client.try_recv().ok()
    }

    /// Everything the client has sent so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Text frames sent so far, decoded as envelopes.
    pub fn drain_envelopes(&mut self) -> Vec<Envelope> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => Envelope::decode(&text).ok().flatten(),
                OutboundFrame::Close { .. } => None,
            })
            .collect()
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.to_client.send(TransportEvent::Closed {
            code: close_code::ABNORMAL,
            reason: String::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url() -> Url {
        Url::parse("ws://localhost:9000/ws/chats").unwrap()
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let connector = MemoryConnector::new();
        let handle = connector.open(&url()).await.unwrap();
        let (outbound, mut inbound) = handle.into_parts();
        let mut peer = connector.next_peer().await.unwrap();

        outbound.send(OutboundFrame::Text("hello".into())).unwrap();
        assert_eq!(peer.recv().await, Some(OutboundFrame::Text("hello".into())));

        peer.send_envelope(&Envelope::new("notification", json!({"id": 1})));
        match inbound.recv().await {
            Some(TransportEvent::Text(text)) => {
                let env = Envelope::decode(&text).unwrap().unwrap();
                assert_eq!(env.event, "notification");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_memory_refused() {
        let connector = MemoryConnector::new();
        connector.refuse_connections(true);
        assert!(connector.open(&url()).await.is_err());
        assert_eq!(connector.attempts(), 1);
        assert!(connector.try_next_peer().is_none());
    }

    #[tokio::test]
    async fn test_dropped_peer_is_abnormal_close() {
        let connector = MemoryConnector::new();
        let (_out, mut inbound) = connector.open(&url()).await.unwrap().into_parts();
        drop(connector.next_peer().await.unwrap());

        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Closed {
                code: close_code::ABNORMAL,
                reason: String::new()
            })
        );
    }

    #[tokio::test]
    async fn test_explicit_close_reports_code() {
        let connector = MemoryConnector::new();
        let (_out, mut inbound) = connector.open(&url()).await.unwrap().into_parts();
        let peer = connector.next_peer().await.unwrap();
        peer.close(close_code::NORMAL, "bye");

        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Closed {
                code: close_code::NORMAL,
                reason: "bye".into()
            })
        );
    }
}
