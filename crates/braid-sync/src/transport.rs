//! # WebSocket Relay Transport
//!
//! The production [`RelayProvider`]: one reconnecting WebSocket client per
//! relay task, reporting its lifecycle as provider events.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Relay Connection Lifecycle                           │
//! │                                                                         │
//! │  ┌────────────┐   connect (timeout)   ┌────────────┐                   │
//! │  │  Backoff   │ ────────────────────► │ Handshake  │                   │
//! │  └────────────┘                       └─────┬──────┘                   │
//! │        ▲   ▲                                │ Hello, SyncState,         │
//! │        │   │ connect failed                 │ Awareness (websocket)     │
//! │        │   └── emit connection-error        ▼                           │
//! │        │                              ┌────────────┐                   │
//! │        │                              │ Connected  │ first SyncState   │
//! │        │                              │            │ ──► emit synced   │
//! │        │                              └─────┬──────┘                   │
//! │        │        socket dropped              │                           │
//! │        ├─── emit lost-connection ◄──────────┤                           │
//! │        │        relay Error message         │                           │
//! │        └─── emit connection-error ◄─────────┘                           │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential)                                        │
//! │  ──────────────────────────────                                        │
//! │  Attempt 1: 500ms, Attempt 2: 1s, Attempt 3: 2s ... Max: 60s           │
//! │                                                                         │
//! │  Dropping the RelayConnection guard stops the loop at any point.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local document updates are forwarded as `Update` messages. Updates made
//! while disconnected are covered by the full state sent on reconnect.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn, Instrument, Span};
use url::Url;

use braid_core::{BackendKind, ProviderEvent};

use crate::error::{SyncError, SyncResult};
use crate::events::ProviderEvents;
use crate::protocol::RelayMessage;
use crate::provider::{RelayConnectRequest, RelayConnection, RelayProvider};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Type alias for the WebSocket write half.
type WsSink = SplitSink<WsStream, WsMessage>;

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the relay transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Maximum consecutive failed connections (0 = infinite).
    pub max_retries: u32,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,

    /// Path segment of the websocket (presence-carrying) variant.
    pub collaboration_path: String,

    /// Path segment of the keck variant.
    pub keck_path: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_retries: 0, // Infinite
            ping_interval: Duration::from_secs(30),
            collaboration_path: "collaboration".to_string(),
            keck_path: "keck".to_string(),
        }
    }
}

// =============================================================================
// Relay Provider
// =============================================================================

/// WebSocket implementation of both relay variants.
#[derive(Debug, Clone, Default)]
pub struct WebSocketRelay {
    config: TransportConfig,
}

impl WebSocketRelay {
    pub fn new(config: TransportConfig) -> Self {
        WebSocketRelay { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Builds `{address}/{variant path}/{workspace}?token=..&{params}`.
    pub fn endpoint(&self, request: &RelayConnectRequest) -> SyncResult<Url> {
        let mut url = Url::parse(&request.address)?;

        let variant_path = match request.variant {
            BackendKind::Keck => &self.config.keck_path,
            _ => &self.config.collaboration_path,
        };

        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(format!("{} cannot be a base", request.address)))?
            .pop_if_empty()
            .push(variant_path)
            .push(&request.workspace);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", &request.token);
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

impl RelayProvider for WebSocketRelay {
    fn connect(
        &self,
        request: RelayConnectRequest,
        events: ProviderEvents,
    ) -> SyncResult<RelayConnection> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let url = self.endpoint(&request)?;
        let (stop_tx, stop_rx) = oneshot::channel();

        let transport = RelayTransport {
            config: self.config.clone(),
            url,
            request,
            events,
        };
        handle.spawn(transport.run(stop_rx).instrument(Span::current()));

        Ok(RelayConnection::new(stop_tx))
    }
}

// =============================================================================
// Transport Loop
// =============================================================================

/// How one established connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// The guard was dropped.
    Stopped,
    /// The socket closed or failed.
    Dropped(String),
    /// The relay sent an error message.
    Rejected(SyncError),
}

struct RelayTransport {
    config: TransportConfig,
    url: Url,
    request: RelayConnectRequest,
    events: ProviderEvents,
}

impl RelayTransport {
    /// Origin tag for updates received from this relay.
    fn origin(&self) -> String {
        format!("relay:{}", self.request.variant)
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) {
        // The token travels in the query string; keep it out of the logs.
        let mut redacted = self.url.clone();
        redacted.set_query(None);
        info!(url = %redacted, "Relay transport starting");

        let origin = self.origin();
        let (local_tx, mut local_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let observer = {
            let origin = origin.clone();
            self.request
                .document
                .observe(Arc::new(move |update: &[u8], from: &str| {
                    if from != origin {
                        let _ = local_tx.send(update.to_vec());
                    }
                }))
        };

        let mut backoff = self.create_backoff();
        let mut retry_count = 0u32;

        loop {
            let attempt = tokio::select! {
                result = self.connect_with_timeout() => result,
                _ = &mut stop => break,
            };

            match attempt {
                Ok(ws_stream) => {
                    info!("Relay connected");
                    backoff.reset();
                    retry_count = 0;

                    match self.session(ws_stream, &mut local_rx, &mut stop, &origin).await {
                        SessionEnd::Stopped => break,
                        SessionEnd::Dropped(reason) => {
                            warn!(reason = %reason, "Relay connection lost");
                            self.events.emit(ProviderEvent::LostConnection);
                        }
                        SessionEnd::Rejected(e) => {
                            warn!(error = %e, "Relay rejected the session");
                            self.events.emit(ProviderEvent::ConnectionError);
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Failed to connect to relay");
                    self.events.emit(ProviderEvent::ConnectionError);
                }
                Err(e) => {
                    error!(error = %e, "Relay connection cannot succeed, giving up");
                    self.events.emit(ProviderEvent::ConnectionError);
                    break;
                }
            }

            if self.config.max_retries > 0 {
                retry_count += 1;
                if retry_count >= self.config.max_retries {
                    error!(
                        max_retries = self.config.max_retries,
                        "Max reconnection attempts reached"
                    );
                    break;
                }
            }

            let Some(delay) = backoff.next_backoff() else {
                error!("Backoff exhausted");
                break;
            };
            debug!(?delay, attempt = retry_count, "Waiting before reconnect");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut stop => break,
            }
        }

        self.request.document.unobserve(observer);
        info!("Relay transport stopped");
    }

    async fn connect_with_timeout(&self) -> SyncResult<WsStream> {
        match timeout(self.config.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Runs one established connection until it ends.
    async fn session(
        &self,
        ws_stream: WsStream,
        local_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        stop: &mut oneshot::Receiver<()>,
        origin: &str,
    ) -> SessionEnd {
        let (mut write, mut read) = ws_stream.split();

        // Everything queued so far is part of the full state sent below.
        while local_rx.try_recv().is_ok() {}

        if let Err(e) = self.handshake(&mut write).await {
            return SessionEnd::Dropped(e.to_string());
        }

        let mut synced = false;
        let period = self.config.ping_interval;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let result = tokio::select! {
                _ = &mut *stop => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Stopped;
                }

                Some(update) = local_rx.recv() => {
                    send(&mut write, &RelayMessage::update(update)).await
                }

                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match RelayMessage::from_json(&text) {
                        Ok(msg) => match self.handle(msg, &mut write, &mut synced, origin).await {
                            Ok(Some(end)) => return end,
                            Ok(None) => Ok(()),
                            Err(e) => Err(e),
                        },
                        Err(e) => {
                            warn!(error = %e, "Failed to parse relay message");
                            Ok(())
                        }
                    },
                    Some(Ok(WsMessage::Ping(data))) => {
                        write.send(WsMessage::Pong(data)).await.map_err(SyncError::from)
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return SessionEnd::Dropped(format!("close frame: {:?}", frame));
                    }
                    Some(Ok(_)) => Ok(()),
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                },

                _ = ping.tick() => {
                    write.send(WsMessage::Ping(Vec::new().into())).await.map_err(SyncError::from)
                }
            };

            if let Err(e) = result {
                return SessionEnd::Dropped(e.to_string());
            }
        }
    }

    /// Sends Hello, the full document state and (websocket only) presence.
    async fn handshake(&self, write: &mut WsSink) -> SyncResult<()> {
        let awareness = self.request.awareness.as_ref();

        send(
            write,
            &RelayMessage::hello(&self.request.workspace, awareness.map(|a| a.client_id())),
        )
        .await?;

        if !self.request.document.is_empty() {
            let state = self.request.document.encode_state();
            send(write, &RelayMessage::sync_state(state)).await?;
        }

        if let Some(awareness) = awareness {
            send(
                write,
                &RelayMessage::awareness(awareness.client_id(), awareness.local_state()),
            )
            .await?;
        }

        Ok(())
    }

    /// Applies one relay message. `Some` ends the connection.
    async fn handle(
        &self,
        msg: RelayMessage,
        write: &mut WsSink,
        synced: &mut bool,
        origin: &str,
    ) -> SyncResult<Option<SessionEnd>> {
        debug!(msg_type = msg.type_name(), "Received message");

        match msg {
            RelayMessage::SyncState(payload) => {
                self.apply(&payload.update, origin);
                if !*synced {
                    *synced = true;
                    info!(bytes = payload.update.len(), "Relay synced");
                    self.events.emit(ProviderEvent::Synced);
                }
            }
            RelayMessage::Update(payload) => self.apply(&payload.update, origin),
            RelayMessage::Awareness(payload) => {
                if let Some(awareness) = &self.request.awareness {
                    if payload.client_id != awareness.client_id() {
                        awareness.apply_remote(payload.client_id, payload.state);
                    }
                }
            }
            RelayMessage::Ping { timestamp } => {
                send(write, &RelayMessage::pong(&timestamp)).await?;
            }
            RelayMessage::Pong { .. } => debug!("Received pong"),
            RelayMessage::Hello(hello) => {
                debug!(version = hello.protocol_version, "Relay hello");
            }
            RelayMessage::Error(payload) => {
                return Ok(Some(SessionEnd::Rejected(SyncError::RelayError {
                    code: payload.code,
                    message: payload.message,
                })));
            }
        }

        Ok(None)
    }

    fn apply(&self, update: &[u8], origin: &str) {
        if let Err(e) = self.request.document.apply_update(update, origin) {
            warn!(error = %e, bytes = update.len(), "Dropped invalid relay update");
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // No limit on total time
            ..Default::default()
        }
    }
}

async fn send(write: &mut WsSink, msg: &RelayMessage) -> SyncResult<()> {
    let json = msg.to_json()?;
    debug!(msg_type = msg.type_name(), "Sending message");
    write.send(WsMessage::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{Document, MemoryAwareness, MemoryDocument, SharedAwareness, LOCAL_ORIGIN};
    use std::collections::BTreeMap;
    use tokio::net::TcpListener;

    fn request(variant: BackendKind, address: &str, doc: Arc<MemoryDocument>) -> RelayConnectRequest {
        RelayConnectRequest {
            variant,
            token: "t0k".to_string(),
            address: address.to_string(),
            workspace: "notes".to_string(),
            document: doc,
            awareness: variant
                .carries_presence()
                .then(|| Arc::new(MemoryAwareness::new(9)) as SharedAwareness),
            params: BTreeMap::from([("room".to_string(), "blue".to_string())]),
        }
    }

    fn fast_config() -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(2),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
            ..Default::default()
        }
    }

    async fn next_message(ws: &mut WebSocketStream<TcpStream>) -> Option<RelayMessage> {
        while let Some(Ok(frame)) = ws.next().await {
            if let WsMessage::Text(text) = frame {
                return RelayMessage::from_json(&text).ok();
            }
        }
        None
    }

    async fn reply(ws: &mut WebSocketStream<TcpStream>, msg: RelayMessage) {
        ws.send(WsMessage::Text(msg.to_json().unwrap().into()))
            .await
            .unwrap();
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.max_retries, 0); // Infinite
    }

    #[test]
    fn test_endpoint_per_variant() {
        let relay = WebSocketRelay::default();
        let doc = MemoryDocument::shared();

        let keck = relay
            .endpoint(&request(BackendKind::Keck, "ws://localhost:3010/", doc.clone()))
            .unwrap();
        assert_eq!(keck.as_str(), "ws://localhost:3010/keck/notes?token=t0k&room=blue");

        let collab = relay
            .endpoint(&request(BackendKind::Websocket, "wss://relay.test/api", doc))
            .unwrap();
        assert_eq!(
            collab.as_str(),
            "wss://relay.test/api/collaboration/notes?token=t0k&room=blue"
        );
    }

    #[tokio::test]
    async fn test_sync_update_and_lost_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            match next_message(&mut ws).await {
                Some(RelayMessage::Hello(hello)) => {
                    assert_eq!(hello.workspace, "notes");
                    assert_eq!(hello.client_id, Some(9));
                }
                other => panic!("expected Hello, got {:?}", other),
            }
            match next_message(&mut ws).await {
                Some(RelayMessage::SyncState(payload)) => {
                    let copy = MemoryDocument::new();
                    copy.apply_update(&payload.update, "relay").unwrap();
                    assert!(copy.contains(b"seed"));
                }
                other => panic!("expected SyncState, got {:?}", other),
            }
            assert!(matches!(next_message(&mut ws).await, Some(RelayMessage::Awareness(_))));

            reply(&mut ws, RelayMessage::sync_state(b"remote".to_vec())).await;

            // The client forwards its own edit, never the one it received.
            match next_message(&mut ws).await {
                Some(RelayMessage::Update(payload)) => assert_eq!(payload.update, b"local-edit"),
                other => panic!("expected Update, got {:?}", other),
            }
            // Dropping the socket ends the connection.
        });

        let doc = MemoryDocument::shared();
        doc.apply_update(b"seed", LOCAL_ORIGIN).unwrap();
        let events = ProviderEvents::new(16);
        let mut every = events.subscribe();
        let relay = WebSocketRelay::new(fast_config());
        let _connection = relay
            .connect(request(BackendKind::Websocket, &address, doc.clone()), events)
            .unwrap();

        let first = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(first, Some(ProviderEvent::Synced));
        assert!(doc.contains(b"remote"));

        doc.apply_update(b"local-edit", LOCAL_ORIGIN).unwrap();
        server.await.unwrap();

        let next = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(next, Some(ProviderEvent::LostConnection));
    }

    #[tokio::test]
    async fn test_empty_document_sends_no_sync_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            assert!(matches!(next_message(&mut ws).await, Some(RelayMessage::Hello(_))));
            reply(&mut ws, RelayMessage::sync_state(b"remote".to_vec())).await;

            // Keck carries no presence, so the next frame is the local edit.
            match next_message(&mut ws).await {
                Some(RelayMessage::Update(payload)) => assert_eq!(payload.update, b"first"),
                other => panic!("expected Update, got {:?}", other),
            }
        });

        let doc = MemoryDocument::shared();
        let events = ProviderEvents::new(16);
        let mut every = events.subscribe();
        let _connection = WebSocketRelay::new(fast_config())
            .connect(request(BackendKind::Keck, &address, doc.clone()), events)
            .unwrap();

        let first = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(first, Some(ProviderEvent::Synced));

        doc.apply_update(b"first", LOCAL_ORIGIN).unwrap();
        timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_relay_error_message_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            assert!(matches!(next_message(&mut ws).await, Some(RelayMessage::Hello(_))));
            reply(&mut ws, RelayMessage::error("UNAUTHORIZED", "bad token")).await;
            // Hold the socket open; the client must end the session itself.
            let _ = ws.next().await;
        });

        let events = ProviderEvents::new(16);
        let mut every = events.subscribe();
        let _connection = WebSocketRelay::new(fast_config())
            .connect(
                request(BackendKind::Keck, &address, MemoryDocument::shared()),
                events,
            )
            .unwrap();

        let first = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(first, Some(ProviderEvent::ConnectionError));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let events = ProviderEvents::new(16);
        let mut every = events.subscribe();
        let connection = WebSocketRelay::new(fast_config())
            .connect(
                request(BackendKind::Keck, &address, MemoryDocument::shared()),
                events,
            )
            .unwrap();

        let first = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(first, Some(ProviderEvent::ConnectionError));

        // Dropping the guard stops the reconnect loop and closes the stream.
        drop(connection);
        let end = timeout(Duration::from_secs(5), async {
            while every.next().await.is_some() {}
        })
        .await;
        assert!(end.is_ok());
    }

    #[tokio::test]
    async fn test_tls_failure_stops_reconnecting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("wss://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                use tokio::io::AsyncWriteExt;
                let _ = stream.write_all(b"HTTP/1.1 400 plain text\r\n\r\n").await;
            }
        });

        let events = ProviderEvents::new(16);
        let mut every = events.subscribe();
        let _connection = WebSocketRelay::new(fast_config())
            .connect(
                request(BackendKind::Keck, &address, MemoryDocument::shared()),
                events,
            )
            .unwrap();

        let first = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(first, Some(ProviderEvent::ConnectionError));

        // The transport gives up, dropping its side of the stream.
        let rest = timeout(Duration::from_secs(5), every.next()).await.unwrap();
        assert_eq!(rest, None);
    }
}
