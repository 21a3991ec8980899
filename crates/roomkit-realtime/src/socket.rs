//! Realtime socket
//!
//! One connection multiplexes every channel topic. A router task hands each
//! incoming frame to the channel registered for its topic, a heartbeat task
//! keeps the connection alive, and all pushes go through a single outbound
//! queue. `connect` bridges that machinery onto a WebSocket; `from_channels`
//! runs it over any pair of string channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::protocol::{PhoenixMessage, PHOENIX_TOPIC};

type TopicMap = DashMap<String, mpsc::UnboundedSender<PhoenixMessage>>;

/// Shared handle to one realtime connection
#[derive(Clone)]
pub struct RealtimeSocket {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    outbound: mpsc::UnboundedSender<String>,
    topics: Arc<TopicMap>,
    refs: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl RealtimeSocket {
    /// Open a WebSocket to the realtime service
    pub async fn connect(config: &RealtimeConfig) -> RealtimeResult<Self> {
        let url = config.websocket_url()?;
        info!(host = url.host_str().unwrap_or_default(), "Connecting to realtime service");

        let (ws, _) = tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            RealtimeError::Connect(format!("timed out after {:?}", config.connect_timeout))
        })?
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        info!(?frame, "Realtime service closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        });

        let socket = Self::from_channels(outbound_tx, inbound_rx, config.heartbeat_interval);
        socket.inner.tasks.lock().extend([writer, reader]);

        info!("Realtime socket connected");
        Ok(socket)
    }

    /// Run the socket over in-memory channels.
    ///
    /// Serialized frames are written to `outbound`; frames read from `inbound`
    /// are routed by topic. Must be called inside a tokio runtime.
    pub fn from_channels(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
        heartbeat_interval: Duration,
    ) -> Self {
        let topics = Arc::new(TopicMap::new());
        let refs = Arc::new(AtomicU64::new(1));
        let alive = Arc::new(AtomicBool::new(true));

        let router = tokio::spawn(route_frames(inbound, Arc::clone(&topics), Arc::clone(&alive)));
        let heartbeat = tokio::spawn(send_heartbeats(
            outbound.clone(),
            Arc::clone(&refs),
            heartbeat_interval,
        ));

        Self {
            inner: Arc::new(SocketInner {
                outbound,
                topics,
                refs,
                alive,
                tasks: Mutex::new(vec![router, heartbeat]),
            }),
        }
    }

    /// Next message ref, unique for this socket
    pub fn next_ref(&self) -> String {
        next_ref(&self.inner.refs)
    }

    /// Queue a frame for sending
    pub fn push(&self, message: &PhoenixMessage) -> RealtimeResult<()> {
        let json = message.to_json()?;
        trace!(%message, "Push");
        self.inner
            .outbound
            .send(json)
            .map_err(|_| RealtimeError::SocketClosed)
    }

    /// Route frames for `topic` to the returned receiver
    pub fn register(&self, topic: &str) -> RealtimeResult<mpsc::UnboundedReceiver<PhoenixMessage>> {
        if !self.is_open() {
            return Err(RealtimeError::SocketClosed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match self.inner.topics.entry(topic.to_string()) {
            Entry::Occupied(mut entry) => {
                // A receiver that was dropped without unregistering frees its topic
                if !entry.get().is_closed() {
                    return Err(RealtimeError::TopicInUse(topic.to_string()));
                }
                entry.insert(tx);
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        debug!(topic = %topic, "Topic registered");
        Ok(rx)
    }

    /// Stop routing frames for `topic`
    pub fn unregister(&self, topic: &str) -> bool {
        let removed = self.inner.topics.remove(topic).is_some();
        if removed {
            debug!(topic = %topic, "Topic unregistered");
        }
        removed
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.inner.topics.contains_key(topic)
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    /// Whether frames can still be sent and received
    pub fn is_open(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst) && !self.inner.outbound.is_closed()
    }

    /// Stop all socket tasks. Registered topics see their streams end.
    pub fn close(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.topics.clear();
        info!("Realtime socket closed");
    }
}

impl std::fmt::Debug for RealtimeSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSocket")
            .field("open", &self.is_open())
            .field("topics", &self.topic_count())
            .finish()
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    refs.fetch_add(1, Ordering::Relaxed).to_string()
}

async fn route_frames(
    mut inbound: mpsc::UnboundedReceiver<String>,
    topics: Arc<TopicMap>,
    alive: Arc<AtomicBool>,
) {
    while let Some(text) = inbound.recv().await {
        let message = match PhoenixMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unrecognized frame");
                continue;
            }
        };

        if message.topic == PHOENIX_TOPIC {
            trace!(%message, "Heartbeat reply");
            continue;
        }

        let topic = message.topic.clone();
        let delivered = topics.get(&topic).map(|tx| tx.send(message).is_ok());
        match delivered {
            Some(true) => {}
            Some(false) => {
                topics.remove(&topic);
                debug!(topic = %topic, "Dropped frame for abandoned topic");
            }
            None => debug!(topic = %topic, "Frame for unregistered topic"),
        }
    }

    info!("Realtime connection ended");
    alive.store(false, Ordering::SeqCst);
    topics.clear();
}

async fn send_heartbeats(
    outbound: mpsc::UnboundedSender<String>,
    refs: Arc<AtomicU64>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        match PhoenixMessage::heartbeat(next_ref(&refs)).to_json() {
            Ok(json) => {
                if outbound.send(json).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_routes_by_topic() {
        let (socket, server) = MockServer::start();
        let mut lobby = socket.register("realtime:lobby").unwrap();
        let mut other = socket.register("realtime:other").unwrap();

        server.send("realtime:lobby", "broadcast", json!({ "n": 1 }), None);
        server.send("realtime:other", "broadcast", json!({ "n": 2 }), None);

        assert_eq!(lobby.recv().await.unwrap().payload["n"], 1);
        assert_eq!(other.recv().await.unwrap().payload["n"], 2);
    }

    #[tokio::test]
    async fn test_topic_in_use() {
        let (socket, _server) = MockServer::start();
        let _rx = socket.register("realtime:lobby").unwrap();

        assert!(matches!(
            socket.register("realtime:lobby"),
            Err(RealtimeError::TopicInUse(_))
        ));

        assert!(socket.unregister("realtime:lobby"));
        assert!(socket.register("realtime:lobby").is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_frees_topic() {
        let (socket, _server) = MockServer::start();
        drop(socket.register("realtime:lobby").unwrap());

        assert!(socket.register("realtime:lobby").is_ok());
    }

    #[tokio::test]
    async fn test_push_writes_frame() {
        let (socket, mut server) = MockServer::start();
        let msg = PhoenixMessage::leave("realtime:lobby", socket.next_ref());
        socket.push(&msg).unwrap();

        let frame = server.next_frame().await.unwrap();
        assert_eq!(frame, msg);
    }

    #[tokio::test]
    async fn test_refs_increase() {
        let (socket, _server) = MockServer::start();
        let a: u64 = socket.next_ref().parse().unwrap();
        let b: u64 = socket.next_ref().parse().unwrap();
        assert!(b > a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat() {
        let (_socket, mut server) = MockServer::start();

        tokio::time::sleep(Duration::from_secs(26)).await;

        let frame = server.next_raw_frame().await.unwrap();
        assert_eq!(frame.topic, "phoenix");
        assert_eq!(frame.event, "heartbeat");
    }

    #[tokio::test]
    async fn test_server_disconnect_ends_topics() {
        let (socket, server) = MockServer::start();
        let mut lobby = socket.register("realtime:lobby").unwrap();

        drop(server);

        assert!(lobby.recv().await.is_none());
        assert!(!socket.is_open());
        assert!(matches!(
            socket.register("realtime:other"),
            Err(RealtimeError::SocketClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (socket, _server) = MockServer::start();
        let mut lobby = socket.register("realtime:lobby").unwrap();

        socket.close();
        socket.close();

        assert!(lobby.recv().await.is_none());
        assert_eq!(socket.topic_count(), 0);
    }
}
