//! Session channel manager: at most one live note channel at a time.
//!
//! Switching notes tears the old channel down (`leaveNote`, flush, close)
//! before the new one connects and joins. Inbound frames are read only from
//! the active channel, so nothing queued on an old channel can reach the
//! caller after a switch.

use notely_core::{Identity, NoteDraft, NoteId};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::channel::{ConnectionState, LoopbackPeer, NoteChannel};
use crate::config::ClientConfig;
use crate::protocol::{connection_url, ClientEvent, ProtocolError, ServerEvent};
use crate::typing::TypingDebounce;

/// Callbacks for inbound session events.
pub trait SessionHooks {
    fn on_peer_typing(&mut self, name: &str);
    fn on_peer_stop_typing(&mut self);
    fn on_note_broadcast(&mut self, draft: &NoteDraft);
    fn on_membership_changed(&mut self, message: Option<&str>);
    fn on_connection_lost(&mut self) {}
}

/// What [`SessionManager::next_event`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An event from a peer on the active note.
    Peer(ServerEvent),
    /// The typing debounce expired and `stopTyping` was emitted.
    TypingStopped,
    /// The active channel's connection went away.
    ConnectionLost,
}

pub struct SessionManager {
    config: ClientConfig,
    active: Option<NoteChannel>,
    /// False once the active channel's inbound queue has ended.
    inbound_open: bool,
    debounce: TypingDebounce,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> Self {
        let debounce = TypingDebounce::new(config.typing_timeout);
        Self {
            config,
            active: None,
            inbound_open: false,
            debounce,
        }
    }

    /// Make `note_id` the active note for `user`.
    ///
    /// A no-op when that pair is already active and not offline. Connection
    /// failures are logged and leave an offline channel behind; check
    /// [`Self::status`].
    pub async fn open(&mut self, note_id: NoteId, user: &Identity) -> ConnectionState {
        if let Some(channel) = &self.active {
            let state = channel.state();
            if channel.note_id() == &note_id
                && channel.user().id == user.id
                && state != ConnectionState::Disconnected
            {
                return state;
            }
        }

        self.close().await;

        let channel = match self.connect(&note_id, user).await {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("Could not open channel for note {note_id}: {e}");
                NoteChannel::offline(note_id, user.clone())
            }
        };
        self.activate(channel)
    }

    /// Install an already-built channel, replacing the active one.
    pub async fn attach(&mut self, channel: NoteChannel) -> ConnectionState {
        self.close().await;
        self.activate(channel)
    }

    /// Attach an in-process channel and return its far end.
    pub async fn open_loopback(&mut self, note_id: NoteId, user: &Identity) -> LoopbackPeer {
        let (channel, peer) =
            NoteChannel::loopback(note_id, user.clone(), self.config.channel_capacity);
        self.attach(channel).await;
        peer
    }

    async fn connect(&self, note_id: &NoteId, user: &Identity) -> Result<NoteChannel, ProtocolError> {
        let base = self
            .config
            .socket_url()
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        let url = connection_url(&base, &user.id);
        NoteChannel::connect(
            &url,
            note_id.clone(),
            user.clone(),
            self.config.channel_capacity,
            self.config.close_timeout,
        )
        .await
    }

    fn activate(&mut self, channel: NoteChannel) -> ConnectionState {
        channel.join();
        log::info!(
            "Joined note {} as {} (channel {})",
            channel.note_id(),
            channel.user().name,
            channel.id()
        );
        let state = channel.state();
        self.debounce.cancel();
        self.inbound_open = true;
        self.active = Some(channel);
        state
    }

    /// Leave and close the active channel. Idempotent.
    pub async fn close(&mut self) {
        self.debounce.cancel();
        self.inbound_open = false;
        if let Some(channel) = self.active.take() {
            log::info!("Leaving note {}", channel.note_id());
            channel.close().await;
        }
    }

    pub fn note_id(&self) -> Option<&NoteId> {
        self.active.as_ref().map(NoteChannel::note_id)
    }

    pub fn status(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map_or(ConnectionState::Disconnected, NoteChannel::state)
    }

    /// Status updates for the active channel, if any.
    pub fn subscribe_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.active.as_ref().map(NoteChannel::subscribe_state)
    }

    /// A local keystroke: emit `typing` and push the `stopTyping` deadline out.
    pub fn keystroke(&mut self) -> bool {
        let Some(channel) = &self.active else {
            return false;
        };
        self.debounce.keystroke(Instant::now());
        channel.emit(ClientEvent::Typing {
            note_id: channel.note_id().clone(),
            user: channel.user().name.clone(),
        })
    }

    /// Emit `stopTyping` now and drop any pending deadline.
    pub fn stop_typing(&mut self) -> bool {
        self.debounce.cancel();
        self.emit_with(|note_id| ClientEvent::StopTyping { note_id })
    }

    pub fn note_updated(&self, draft: NoteDraft) -> bool {
        self.emit_with(|note_id| ClientEvent::NoteUpdated { note_id, data: draft })
    }

    pub fn collaborator_updated(&self) -> bool {
        self.emit_with(|note_id| ClientEvent::CollaboratorUpdated { note_id })
    }

    fn emit_with(&self, event: impl FnOnce(NoteId) -> ClientEvent) -> bool {
        match &self.active {
            Some(channel) => channel.emit(event(channel.note_id().clone())),
            None => false,
        }
    }

    /// Wait for the next inbound event or the typing deadline.
    ///
    /// Frames naming a different note are dropped. Returns `None` when there
    /// is nothing left to wait for: no channel, or a dead channel with no
    /// pending `stopTyping`.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let channel = self.active.as_mut()?;
            let deadline = self.debounce.deadline();

            tokio::select! {
                frame = channel.recv(), if self.inbound_open => {
                    let Some(frame) = frame else {
                        self.inbound_open = false;
                        log::warn!("Lost connection for note {:?}", self.note_id());
                        return Some(SessionEvent::ConnectionLost);
                    };
                    let active = self.note_id();
                    if let Some(id) = &frame.note_id {
                        if Some(id) != active {
                            log::debug!("Dropping stale {} for note {id}", frame.event.name());
                            continue;
                        }
                    }
                    log::debug!("Received {} on note {:?}", frame.event.name(), active);
                    return Some(SessionEvent::Peer(frame.event));
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.debounce.poll(Instant::now()) {
                        self.emit_with(|note_id| ClientEvent::StopTyping { note_id });
                        return Some(SessionEvent::TypingStopped);
                    }
                }
                else => return None,
            }
        }
    }

    /// Run hooks for inbound events until the session has nothing left.
    pub async fn pump<H: SessionHooks>(&mut self, hooks: &mut H) {
        while let Some(event) = self.next_event().await {
            dispatch(event, hooks);
        }
    }
}

/// Route one session event to its hook.
pub fn dispatch<H: SessionHooks + ?Sized>(event: SessionEvent, hooks: &mut H) {
    match event {
        SessionEvent::Peer(ServerEvent::Typing(name)) => hooks.on_peer_typing(&name),
        SessionEvent::Peer(ServerEvent::StopTyping) => hooks.on_peer_stop_typing(),
        SessionEvent::Peer(ServerEvent::NoteUpdated(draft)) => hooks.on_note_broadcast(&draft),
        SessionEvent::Peer(ServerEvent::CollaboratorUpdated { message }) => {
            hooks.on_membership_changed(message.as_deref())
        }
        SessionEvent::ConnectionLost => hooks.on_connection_lost(),
        SessionEvent::TypingStopped => {}
    }
}
