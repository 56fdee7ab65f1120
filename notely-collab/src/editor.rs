//! The note editor: one mounted note, its live session and its membership
//! panel.
//!
//! Owns the only note channel in the process while mounted. Unmounting
//! closes the channel and drops the local state; the server keeps the
//! authoritative copy.

use notely_core::{
    Field, Identity, NoteId, NoteProjection, NoteStore, Notice, SaveOutcome, UserId,
};
use tokio::time::Instant;

use crate::channel::ConnectionState;
use crate::config::ClientConfig;
use crate::membership::{search_users, MemberAction, MemberPolicy, Membership};
use crate::protocol::ServerEvent;
use crate::route::Route;
use crate::session::{SessionEvent, SessionManager};
use crate::typing::TypingIndicator;

pub const LOAD_FAILED: &str = "Error loading note";
pub const SAVE_FAILED: &str = "Failed to save";
pub const DELETE_FAILED: &str = "Error deleting notes";

pub struct NoteEditor<S> {
    store: S,
    user: Identity,
    session: SessionManager,
    projection: Option<NoteProjection>,
    typing: TypingIndicator,
    directory: Vec<Identity>,
    selected_user: Option<UserId>,
    notices: Vec<Notice>,
}

impl<S: NoteStore> NoteEditor<S> {
    pub fn new(store: S, user: Identity, config: ClientConfig) -> Self {
        let typing = TypingIndicator::new(Some(user.name.clone()), config.typing_timeout);
        Self {
            store,
            user,
            session: SessionManager::new(config),
            projection: None,
            typing,
            directory: Vec::new(),
            selected_user: None,
            notices: Vec::new(),
        }
    }

    /// Show the note `route` points at.
    ///
    /// An existing note is loaded and its channel opened; an unsaved note
    /// has no id to join yet, so it gets a channel once it is created. When
    /// loading fails nothing is mounted, so a later save cannot overwrite the
    /// stored note with an empty draft.
    pub async fn mount(&mut self, route: &Route) {
        self.unmount().await;
        match route {
            Route::NewNote => {
                self.projection = Some(NoteProjection::new_note());
            }
            Route::Note(id) => {
                let mut projection = NoteProjection::existing(id.clone());
                if let Err(e) = projection.load(&self.store, id).await {
                    log::warn!("Loading note {id} failed: {e}");
                    self.notices.push(e.notice(LOAD_FAILED));
                    return;
                }
                self.projection = Some(projection);
                self.session.open(id.clone(), &self.user).await;
            }
            other => log::debug!("Editor ignores route {other}"),
        }
    }

    /// Close the channel and forget the note.
    pub async fn unmount(&mut self) {
        self.session.close().await;
        self.projection = None;
        self.typing.clear();
        self.selected_user = None;
    }

    /// A local keystroke in the title or body.
    pub fn edit(&mut self, field: Field, value: impl Into<String>) {
        let Some(projection) = self.projection.as_mut() else {
            return;
        };
        projection.apply_local_edit(field, value);
        self.session.keystroke();
    }

    /// Persist the note. Returns the route to follow when a new note was created.
    pub async fn save(&mut self) -> Option<Route> {
        let projection = self.projection.as_mut()?;
        match projection.save(&self.store).await {
            Ok(SaveOutcome::Created(id)) => {
                self.notices.push(Notice::success("Note created"));
                self.session.open(id.clone(), &self.user).await;
                Some(Route::Note(id))
            }
            Ok(SaveOutcome::Updated(_)) => {
                self.session.note_updated(projection.draft());
                self.notices.push(Notice::success("Note updated!"));
                None
            }
            Err(e) => {
                log::warn!("Saving note {:?} failed: {e}", projection.key());
                self.notices.push(e.notice(SAVE_FAILED));
                None
            }
        }
    }

    /// Delete the open note (owner only); returns the dashboard route on success.
    pub async fn delete(&mut self) -> Option<Route> {
        let id = self.projection.as_ref()?.id()?.clone();
        if !self.is_owner() {
            log::debug!("Refusing to delete note {id} owned by someone else");
            return None;
        }
        let result = self.store.delete_notes(std::slice::from_ref(&id)).await;
        match result {
            Ok(()) => {
                self.notices.push(Notice::success("Selected notes deleted"));
                self.unmount().await;
                Some(Route::Dashboard)
            }
            Err(e) => {
                self.notices.push(e.notice(DELETE_FAILED));
                None
            }
        }
    }

    /// Wait for the next session event and apply it. False once the session
    /// has nothing more to deliver.
    pub async fn step(&mut self) -> bool {
        match self.session.next_event().await {
            Some(event) => {
                self.apply(event).await;
                true
            }
            None => false,
        }
    }

    pub async fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Peer(ServerEvent::Typing(name)) => {
                self.typing.peer_typing(&name, Instant::now());
            }
            SessionEvent::Peer(ServerEvent::StopTyping) => self.typing.peer_stopped(),
            SessionEvent::Peer(ServerEvent::NoteUpdated(draft)) => {
                if let Some(projection) = self.projection.as_mut() {
                    projection.apply_remote_broadcast(&draft);
                }
            }
            SessionEvent::Peer(ServerEvent::CollaboratorUpdated { message }) => {
                if let Some(projection) = self.projection.as_mut() {
                    let notice = Membership::new(&self.store, &self.session)
                        .refresh(projection, message.as_deref())
                        .await;
                    self.notices.push(notice);
                }
            }
            SessionEvent::TypingStopped => {}
            SessionEvent::ConnectionLost => {
                log::warn!("Live updates stopped for note {:?}", self.session.note_id());
            }
        }
    }

    /// Replace the user directory used for collaborator search.
    pub fn set_directory(&mut self, users: Vec<Identity>) {
        self.directory = users;
    }

    pub fn search(&self, query: &str) -> Vec<&Identity> {
        search_users(&self.directory, query)
    }

    pub fn select_user(&mut self, user: Option<UserId>) {
        self.selected_user = user;
    }

    pub async fn add_collaborator(&mut self) {
        let Some(projection) = self.projection.as_mut() else {
            return;
        };
        let result = Membership::new(&self.store, &self.session)
            .add(projection, self.selected_user.as_ref())
            .await;
        if result.is_ok() {
            self.selected_user = None;
        }
        self.notices.push(result.unwrap_or_else(|notice| notice));
    }

    pub async fn remove_collaborator(&mut self, user: &UserId) {
        let Some(projection) = self.projection.as_mut() else {
            return;
        };
        let result = Membership::new(&self.store, &self.session)
            .remove(projection, user)
            .await;
        self.notices.push(result.unwrap_or_else(|notice| notice));
    }

    /// Leave the note; returns the dashboard route on success.
    pub async fn leave(&mut self) -> Option<Route> {
        let projection = self.projection.as_ref()?;
        let result = Membership::new(&self.store, &self.session).leave(projection).await;
        match result {
            Ok(route) => {
                self.notices.push(Notice::success("You left the note"));
                self.unmount().await;
                Some(route)
            }
            Err(notice) => {
                self.notices.push(notice);
                None
            }
        }
    }

    /// Actions to offer next to `collaborator` for the signed-in user.
    pub fn member_actions(&self, collaborator: &UserId) -> Vec<MemberAction> {
        match self.projection.as_ref().and_then(NoteProjection::owner) {
            Some(owner) => MemberPolicy::actions(&self.user.id, owner, collaborator),
            None => Vec::new(),
        }
    }

    /// Whether a note is shown (a new draft or a successfully loaded note).
    pub fn is_mounted(&self) -> bool {
        self.projection.is_some()
    }

    pub fn is_owner(&self) -> bool {
        self.projection
            .as_ref()
            .is_some_and(|p| p.is_owner(&self.user.id))
    }

    pub fn projection(&self) -> Option<&NoteProjection> {
        self.projection.as_ref()
    }

    pub fn note_id(&self) -> Option<&NoteId> {
        self.projection.as_ref().and_then(NoteProjection::id)
    }

    pub fn typing_label(&self) -> Option<String> {
        self.typing.label(Instant::now())
    }

    pub fn status(&self) -> ConnectionState {
        self.session.status()
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
