//! Throw-away WebSocket event relay with per-note rooms.
//!
//! Mirrors what the real server does with channel traffic: `joinNote` and
//! `leaveNote` manage room membership, everything else is fanned out to the
//! other members of the note's room. Every client event is recorded.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use notely_collab::protocol::{ClientEvent, ServerEvent, ServerFrame};
use notely_core::NoteId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

type Outbox = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct RelayState {
    rooms: Mutex<HashMap<NoteId, Vec<(u64, Outbox)>>>,
    events: Mutex<Vec<(String, ClientEvent)>>,
    connected: Mutex<Vec<(u64, String)>>,
    next_conn: AtomicU64,
}

#[derive(Clone)]
pub struct Relay {
    addr: SocketAddr,
    state: Arc<RelayState>,
}

impl Relay {
    /// Bind on a free port and start accepting.
    pub async fn start() -> Relay {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(RelayState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        log::debug!("Relay connection ended: {e}");
                    }
                });
            }
        });

        Relay { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every client event received so far, tagged with the sender's user id.
    pub fn events(&self) -> Vec<(String, ClientEvent)> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn events_from(&self, user: &str) -> Vec<ClientEvent> {
        self.events()
            .into_iter()
            .filter(|(u, _)| u == user)
            .map(|(_, e)| e)
            .collect()
    }

    /// User ids of the open connections.
    pub fn connected_users(&self) -> Vec<String> {
        self.state
            .connected
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user)| user.clone())
            .collect()
    }

    pub fn room_size(&self, note: &str) -> usize {
        self.state
            .rooms
            .lock()
            .unwrap()
            .get(&NoteId::new(note))
            .map_or(0, Vec::len)
    }

    /// Poll until `check` holds or two seconds pass.
    pub async fn wait_until(&self, check: impl Fn(&Relay) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check(self) {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        check(self)
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<RelayState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut user = String::new();
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        if let Some(query) = req.uri().query() {
            if let Some((_, id)) = url::form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == "userId") {
                user = id.into_owned();
            }
        }
        Ok(resp)
    })
    .await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let conn = state.next_conn.fetch_add(1, Ordering::Relaxed);
    state.connected.lock().unwrap().push((conn, user.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let Ok(event) = ClientEvent::decode(text.as_str()) else {
            continue;
        };
        state.events.lock().unwrap().push((user.clone(), event.clone()));
        route(&state, conn, &tx, event);
    }

    for members in state.rooms.lock().unwrap().values_mut() {
        members.retain(|(id, _)| *id != conn);
    }
    state.connected.lock().unwrap().retain(|(id, _)| *id != conn);
    writer.abort();
    Ok(())
}

fn route(state: &RelayState, conn: u64, tx: &Outbox, event: ClientEvent) {
    let mut rooms = state.rooms.lock().unwrap();
    let (note_id, outbound) = match event {
        ClientEvent::JoinNote(note_id) => {
            let members = rooms.entry(note_id).or_default();
            if !members.iter().any(|(id, _)| *id == conn) {
                members.push((conn, tx.clone()));
            }
            return;
        }
        ClientEvent::LeaveNote(note_id) => {
            if let Some(members) = rooms.get_mut(&note_id) {
                members.retain(|(id, _)| *id != conn);
            }
            return;
        }
        ClientEvent::Typing { note_id, user } => (note_id, ServerEvent::Typing(user)),
        ClientEvent::StopTyping { note_id } => (note_id, ServerEvent::StopTyping),
        ClientEvent::NoteUpdated { note_id, data } => (note_id, ServerEvent::NoteUpdated(data)),
        ClientEvent::CollaboratorUpdated { note_id } => (
            note_id,
            ServerEvent::CollaboratorUpdated {
                message: Some("Collaborators changed".into()),
            },
        ),
    };

    let Ok(text) = ServerFrame::for_note(outbound, note_id.clone()).encode() else {
        return;
    };
    if let Some(members) = rooms.get(&note_id) {
        for (id, member) in members {
            if *id != conn {
                let _ = member.send(text.clone());
            }
        }
    }
}
