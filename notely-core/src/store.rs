//! Persistence seam.
//!
//! The REST API is the source of truth; everything in this crate reads and
//! writes notes through [`NoteStore`]. `notely-collab` provides the HTTP
//! implementation, [`MemoryStore`] is an in-process one that enforces the
//! same ownership rules the server does.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::model::{Identity, Note, NoteDraft, NoteId, UserId};

/// Note and collaborator endpoints of the persistence API.
pub trait NoteStore {
    /// `GET /notes`
    fn list_notes(&self) -> impl Future<Output = Result<Vec<Note>, StoreError>> + Send;
    /// `GET /notes/:id`
    fn get_note(&self, id: &NoteId) -> impl Future<Output = Result<Note, StoreError>> + Send;
    /// `POST /notes`
    fn create_note(&self, draft: &NoteDraft) -> impl Future<Output = Result<Note, StoreError>> + Send;
    /// `PUT /notes/:id`
    fn update_note(
        &self,
        id: &NoteId,
        draft: &NoteDraft,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// `POST /notes/bulk-delete`
    fn delete_notes(&self, ids: &[NoteId]) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// `GET /notes/:id/collaborators`
    fn collaborators(
        &self,
        id: &NoteId,
    ) -> impl Future<Output = Result<Vec<Identity>, StoreError>> + Send;
    /// `POST /notes/:id/collaborators`
    fn add_collaborator(
        &self,
        id: &NoteId,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<Identity>, StoreError>> + Send;
    /// `DELETE /notes/:id/collaborators/:userId`
    fn remove_collaborator(
        &self,
        id: &NoteId,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<Identity>, StoreError>> + Send;
    /// `POST /notes/:id/leave`
    fn leave_note(&self, id: &NoteId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Default)]
struct MemoryState {
    notes: Vec<Note>,
    users: Vec<Identity>,
}

/// In-process [`NoteStore`] acting on behalf of one user.
///
/// Clones share state, so several "clients" can act on the same notes.
#[derive(Clone)]
pub struct MemoryStore {
    acting: Identity,
    state: Arc<Mutex<MemoryState>>,
    next_id: Arc<AtomicU64>,
    calls: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new(acting: Identity) -> Self {
        let state = MemoryState {
            notes: Vec::new(),
            users: vec![acting.clone()],
        };
        Self {
            acting,
            state: Arc::new(Mutex::new(state)),
            next_id: Arc::new(AtomicU64::new(1)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Same backing data, different acting user.
    pub fn acting_as(&self, user: Identity) -> Self {
        let mut other = self.clone();
        if let Ok(mut state) = self.state.lock() {
            if !state.users.iter().any(|u| u.id == user.id) {
                state.users.push(user.clone());
            }
        }
        other.acting = user;
        other
    }

    pub fn acting(&self) -> &Identity {
        &self.acting
    }

    pub fn register_user(&self, user: Identity) {
        if let Ok(mut state) = self.state.lock() {
            if !state.users.iter().any(|u| u.id == user.id) {
                state.users.push(user);
            }
        }
    }

    pub fn users(&self) -> Vec<Identity> {
        self.lock().map(|s| s.users.clone()).unwrap_or_default()
    }

    /// Insert a note as-is (fixtures).
    pub fn insert(&self, note: Note) {
        if let Ok(mut state) = self.state.lock() {
            state.notes.retain(|n| n.id != note.id);
            state.notes.push(note);
        }
    }

    pub fn snapshot(&self, id: &NoteId) -> Option<Note> {
        self.lock().ok()?.notes.iter().find(|n| &n.id == id).cloned()
    }

    /// Number of store operations performed through any clone.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn can_view(&self, note: &Note) -> bool {
        note.owner.id == self.acting.id || note.collaborators.iter().any(|c| c.id == self.acting.id)
    }

    fn forbidden(message: &str) -> StoreError {
        StoreError::Api {
            status: 403,
            message: Some(message.to_string()),
        }
    }

    fn list_sync(&self) -> Result<Vec<Note>, StoreError> {
        self.record();
        let state = self.lock()?;
        Ok(state.notes.iter().filter(|n| self.can_view(n)).cloned().collect())
    }

    fn get_sync(&self, id: &NoteId) -> Result<Note, StoreError> {
        self.record();
        let state = self.lock()?;
        let note = state.notes.iter().find(|n| &n.id == id).ok_or(StoreError::NotFound)?;
        if !self.can_view(note) {
            return Err(Self::forbidden("Access denied"));
        }
        Ok(note.clone())
    }

    fn create_sync(&self, draft: &NoteDraft) -> Result<Note, StoreError> {
        self.record();
        let mut state = self.lock()?;
        let id = NoteId::new(format!("note-{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
        let note = Note {
            id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            owner: self.acting.clone(),
            collaborators: Vec::new(),
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    fn update_sync(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), StoreError> {
        self.record();
        let mut state = self.lock()?;
        let acting = self.acting.id.clone();
        let note = state.notes.iter_mut().find(|n| &n.id == id).ok_or(StoreError::NotFound)?;
        if note.owner.id != acting && !note.collaborators.iter().any(|c| c.id == acting) {
            return Err(Self::forbidden("Access denied"));
        }
        note.title = draft.title.clone();
        note.content = draft.content.clone();
        Ok(())
    }

    fn delete_sync(&self, ids: &[NoteId]) -> Result<(), StoreError> {
        self.record();
        let mut state = self.lock()?;
        let acting = self.acting.id.clone();
        state.notes.retain(|n| !(ids.contains(&n.id) && n.owner.id == acting));
        Ok(())
    }

    fn collaborators_sync(&self, id: &NoteId) -> Result<Vec<Identity>, StoreError> {
        Ok(self.get_sync(id)?.collaborators)
    }

    fn add_sync(&self, id: &NoteId, user: &UserId) -> Result<Vec<Identity>, StoreError> {
        self.record();
        let mut state = self.lock()?;
        let acting = self.acting.id.clone();
        let identity = state
            .users
            .iter()
            .find(|u| &u.id == user)
            .cloned()
            .ok_or(StoreError::Api { status: 404, message: Some("User not found".into()) })?;
        let note = state.notes.iter_mut().find(|n| &n.id == id).ok_or(StoreError::NotFound)?;
        if note.owner.id != acting {
            return Err(Self::forbidden("Only the owner can add collaborators"));
        }
        if note.owner.id == *user || note.collaborators.iter().any(|c| &c.id == user) {
            return Err(StoreError::Api {
                status: 400,
                message: Some("User is already a collaborator".into()),
            });
        }
        note.collaborators.push(identity);
        Ok(note.collaborators.clone())
    }

    fn remove_sync(&self, id: &NoteId, user: &UserId) -> Result<Vec<Identity>, StoreError> {
        self.record();
        let mut state = self.lock()?;
        let acting = self.acting.id.clone();
        let note = state.notes.iter_mut().find(|n| &n.id == id).ok_or(StoreError::NotFound)?;
        if note.owner.id != acting {
            return Err(Self::forbidden("Only the owner can remove collaborators"));
        }
        note.collaborators.retain(|c| &c.id != user);
        Ok(note.collaborators.clone())
    }

    fn leave_sync(&self, id: &NoteId) -> Result<(), StoreError> {
        self.record();
        let mut state = self.lock()?;
        let acting = self.acting.id.clone();
        let note = state.notes.iter_mut().find(|n| &n.id == id).ok_or(StoreError::NotFound)?;
        if note.owner.id == acting {
            return Err(Self::forbidden("Owner cannot leave their own note"));
        }
        if !note.collaborators.iter().any(|c| c.id == acting) {
            return Err(Self::forbidden("Not a collaborator"));
        }
        note.collaborators.retain(|c| c.id != acting);
        Ok(())
    }
}

impl NoteStore for MemoryStore {
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        self.list_sync()
    }

    async fn get_note(&self, id: &NoteId) -> Result<Note, StoreError> {
        self.get_sync(id)
    }

    async fn create_note(&self, draft: &NoteDraft) -> Result<Note, StoreError> {
        self.create_sync(draft)
    }

    async fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), StoreError> {
        self.update_sync(id, draft)
    }

    async fn delete_notes(&self, ids: &[NoteId]) -> Result<(), StoreError> {
        self.delete_sync(ids)
    }

    async fn collaborators(&self, id: &NoteId) -> Result<Vec<Identity>, StoreError> {
        self.collaborators_sync(id)
    }

    async fn add_collaborator(&self, id: &NoteId, user: &UserId) -> Result<Vec<Identity>, StoreError> {
        self.add_sync(id, user)
    }

    async fn remove_collaborator(
        &self,
        id: &NoteId,
        user: &UserId,
    ) -> Result<Vec<Identity>, StoreError> {
        self.remove_sync(id, user)
    }

    async fn leave_note(&self, id: &NoteId) -> Result<(), StoreError> {
        self.leave_sync(id)
    }
}
