//! WebSocket links and the note-scoped channel built on them.
//!
//! A [`Link`] is one connection with a writer task draining an outbound
//! queue and a reader task decoding frames into an inbound queue. Nothing is
//! acknowledged or retried; a dropped connection just flips the observable
//! [`ConnectionState`] to `Disconnected`.
//!
//! ```text
//!   emit() ──► outgoing queue ──► writer task ──► ws sink
//!                                                   │
//!   recv() ◄── inbound queue  ◄── reader task ◄── ws stream
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use notely_core::{Identity, NoteId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use uuid::Uuid;

use crate::protocol::{ClientEvent, ProtocolError, ServerFrame};

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One live connection (or a detached stand-in for one).
pub(crate) struct Link {
    outgoing_tx: Option<mpsc::Sender<String>>,
    inbound_rx: mpsc::Receiver<ServerFrame>,
    state_tx: watch::Sender<ConnectionState>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Link {
    /// Open a WebSocket connection and spawn its reader/writer tasks.
    pub(crate) async fn connect(url: &Url, capacity: usize) -> Result<Self, ProtocolError> {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(capacity);
        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(capacity);

        // Writer task: forward the outgoing queue to the socket, then close.
        let writer_state = state_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    log::debug!("Channel write failed, dropping outbound queue");
                    writer_state.send_replace(ConnectionState::Disconnected);
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
            let _ = ws_writer.close().await;
        });

        // Reader task: decode frames into the inbound queue.
        let reader_state = state_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerFrame::decode(text.as_str()) {
                        Ok(Some(frame)) => {
                            if in_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            reader_state.send_replace(ConnectionState::Disconnected);
        });

        state_tx.send_replace(ConnectionState::Connected);

        Ok(Self {
            outgoing_tx: Some(out_tx),
            inbound_rx: in_rx,
            state_tx,
            writer: Some(writer),
            reader: Some(reader),
        })
    }

    /// A link that never connected. Emits go nowhere, nothing arrives.
    pub(crate) fn offline() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (_, inbound_rx) = mpsc::channel(1);
        Self {
            outgoing_tx: None,
            inbound_rx,
            state_tx,
            writer: None,
            reader: None,
        }
    }

    /// An in-process link whose other end is a [`LoopbackPeer`].
    pub(crate) fn loopback(capacity: usize) -> (Self, LoopbackPeer) {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let link = Self {
            outgoing_tx: Some(out_tx),
            inbound_rx: in_rx,
            state_tx: state_tx.clone(),
            writer: None,
            reader: None,
        };
        let peer = LoopbackPeer {
            outbound: out_rx,
            inbound: in_tx,
            state: state_tx,
        };
        (link, peer)
    }

    /// Queue an event without waiting. Returns whether it was queued.
    pub(crate) fn emit(&self, event: &ClientEvent) -> bool {
        let Some(tx) = &self.outgoing_tx else {
            log::debug!("Dropping {} on an offline channel", event.name());
            return false;
        };
        let text = match event.encode() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to encode {}: {e}", event.name());
                return false;
            }
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Dropping {}: {e}", event.name());
                false
            }
        }
    }

    pub(crate) async fn recv(&mut self) -> Option<ServerFrame> {
        self.inbound_rx.recv().await
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Flush queued frames (bounded by `timeout`), then close.
    pub(crate) async fn shutdown(&mut self, timeout: Duration) {
        // Dropping the sender lets the writer drain and send Close.
        self.outgoing_tx = None;
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(timeout, writer).await.is_err() {
                log::debug!("Channel flush timed out");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inbound_rx.close();
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// The far end of an in-process link: sees what the client emitted and
/// can push frames to it.
pub struct LoopbackPeer {
    outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<ServerFrame>,
    state: watch::Sender<ConnectionState>,
}

impl LoopbackPeer {
    /// Next event the client emitted, or `None` once the client closed.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            let text = self.outbound.recv().await?;
            match ClientEvent::decode(&text) {
                Ok(event) => return Some(event),
                Err(e) => log::warn!("Loopback peer got undecodable frame: {e}"),
            }
        }
    }

    /// Everything emitted so far, without waiting.
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            if let Ok(event) = ClientEvent::decode(&text) {
                events.push(event);
            }
        }
        events
    }

    /// Push a frame to the client. Returns false once the client is gone.
    pub async fn push(&self, frame: ServerFrame) -> bool {
        self.inbound.send(frame).await.is_ok()
    }

    /// Simulate a network drop.
    pub fn disconnect(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

/// The channel for one open note.
///
/// Tagged with a fresh id per connection so log lines and events from an
/// old channel can be told apart from the current one.
pub struct NoteChannel {
    id: Uuid,
    note_id: NoteId,
    user: Identity,
    link: Link,
    close_timeout: Duration,
}

impl NoteChannel {
    /// Connect to `url` (already carrying `?userId=`). Does not join.
    pub async fn connect(
        url: &Url,
        note_id: NoteId,
        user: Identity,
        capacity: usize,
        close_timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let link = Link::connect(url, capacity).await?;
        let channel = Self::with_link(note_id, user, link, close_timeout);
        log::info!("Channel {} connected for note {}", channel.id, channel.note_id);
        Ok(channel)
    }

    /// Stand-in for a channel whose connection failed.
    pub fn offline(note_id: NoteId, user: Identity) -> Self {
        Self::with_link(note_id, user, Link::offline(), Duration::ZERO)
    }

    /// An in-process channel plus its far end.
    pub fn loopback(note_id: NoteId, user: Identity, capacity: usize) -> (Self, LoopbackPeer) {
        let (link, peer) = Link::loopback(capacity);
        (Self::with_link(note_id, user, link, Duration::ZERO), peer)
    }

    fn with_link(note_id: NoteId, user: Identity, link: Link, close_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            note_id,
            user,
            link,
            close_timeout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn note_id(&self) -> &NoteId {
        &self.note_id
    }

    pub fn user(&self) -> &Identity {
        &self.user
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.link.subscribe()
    }

    /// Best-effort emit; never blocks, never fails loudly.
    pub fn emit(&self, event: ClientEvent) -> bool {
        if event.note_id() != &self.note_id {
            log::warn!(
                "Refusing to emit {} for note {} on channel of note {}",
                event.name(),
                event.note_id(),
                self.note_id
            );
            return false;
        }
        log::trace!("Channel {} emit {}", self.id, event.name());
        self.link.emit(&event)
    }

    pub fn join(&self) -> bool {
        self.emit(ClientEvent::JoinNote(self.note_id.clone()))
    }

    /// Next inbound frame; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        self.link.recv().await
    }

    /// Announce leaving, flush and close.
    pub async fn close(mut self) {
        self.emit(ClientEvent::LeaveNote(self.note_id.clone()));
        self.link.shutdown(self.close_timeout).await;
        log::info!("Channel {} closed for note {}", self.id, self.note_id);
    }
}
