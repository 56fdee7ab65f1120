//! Client-held view of one note.
//!
//! Mutated from three sources with no ordering between them: local edits,
//! remote broadcasts and store responses. Remote broadcasts overwrite the
//! local title/content unconditionally, even over unsaved edits.

use crate::error::{NoteError, StoreError, ValidationError};
use crate::model::{Identity, Note, NoteDraft, NoteId, UserId, PLACEHOLDER_TITLE};
use crate::store::NoteStore;

/// Which note the projection is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKey {
    /// Not created yet; saving creates it.
    New,
    Existing(NoteId),
}

impl NoteKey {
    pub fn id(&self) -> Option<&NoteId> {
        match self {
            NoteKey::New => None,
            NoteKey::Existing(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Content,
}

/// Result of a successful [`NoteProjection::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new note was created; the view should move to this id.
    Created(NoteId),
    Updated(NoteId),
}

impl SaveOutcome {
    pub fn id(&self) -> &NoteId {
        match self {
            SaveOutcome::Created(id) | SaveOutcome::Updated(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoteProjection {
    key: NoteKey,
    title: String,
    content: String,
    owner: Option<UserId>,
    collaborators: Vec<Identity>,
    /// Local edits since the last load/save/broadcast.
    dirty: bool,
}

impl NoteProjection {
    /// Projection for a note that does not exist yet.
    pub fn new_note() -> Self {
        Self {
            key: NoteKey::New,
            title: PLACEHOLDER_TITLE.to_string(),
            content: String::new(),
            owner: None,
            collaborators: Vec::new(),
            dirty: false,
        }
    }

    /// Empty projection bound to an existing id, before loading.
    pub fn existing(id: NoteId) -> Self {
        Self {
            key: NoteKey::Existing(id),
            title: String::new(),
            content: String::new(),
            owner: None,
            collaborators: Vec::new(),
            dirty: false,
        }
    }

    pub fn from_note(note: &Note) -> Self {
        let mut projection = Self::existing(note.id.clone());
        projection.replace_with(note);
        projection
    }

    /// Fetch the note and replace the whole projection with it.
    pub async fn load<S: NoteStore>(&mut self, store: &S, id: &NoteId) -> Result<Note, NoteError> {
        let note = store.get_note(id).await.map_err(|e| match e {
            StoreError::NotFound => NoteError::NotFound(id.clone()),
            other => NoteError::Store(other),
        })?;
        self.key = NoteKey::Existing(note.id.clone());
        self.replace_with(&note);
        log::debug!("Loaded note {} ({} collaborators)", note.id, note.collaborators.len());
        Ok(note)
    }

    fn replace_with(&mut self, note: &Note) {
        self.title = note.title.clone();
        self.content = note.content.clone();
        self.owner = Some(note.owner.id.clone());
        self.collaborators = note.collaborators.clone();
        self.dirty = false;
    }

    pub fn apply_local_edit(&mut self, field: Field, value: impl Into<String>) {
        match field {
            Field::Title => self.title = value.into(),
            Field::Content => self.content = value.into(),
        }
        self.dirty = true;
    }

    /// Overwrite title and content with a peer's broadcast.
    ///
    /// No merge and no version comparison: unsaved local edits are lost.
    pub fn apply_remote_broadcast(&mut self, draft: &NoteDraft) {
        if self.dirty {
            log::debug!("Remote broadcast overwrites unsaved local edits on {:?}", self.key);
        }
        self.title = draft.title.clone();
        self.content = draft.content.clone();
        self.dirty = false;
    }

    /// Persist the current title/content.
    ///
    /// Creates the note when the projection is [`NoteKey::New`] and rebinds
    /// the projection to the returned id; updates it otherwise. An empty
    /// draft is rejected before the store is touched.
    pub async fn save<S: NoteStore>(&mut self, store: &S) -> Result<SaveOutcome, NoteError> {
        let draft = self.draft();
        if draft.is_empty() {
            return Err(ValidationError::EmptyNote.into());
        }

        let key = self.key.clone();
        match key {
            NoteKey::New => {
                let note = store.create_note(&draft).await?;
                log::info!("Created note {}", note.id);
                self.key = NoteKey::Existing(note.id.clone());
                self.owner = Some(note.owner.id.clone());
                self.collaborators = note.collaborators.clone();
                self.dirty = false;
                Ok(SaveOutcome::Created(note.id))
            }
            NoteKey::Existing(id) => {
                store.update_note(&id, &draft).await?;
                self.dirty = false;
                log::info!("Updated note {id}");
                Ok(SaveOutcome::Updated(id))
            }
        }
    }

    /// Replace the collaborator list with the server-authoritative one.
    pub fn set_collaborators(&mut self, collaborators: Vec<Identity>) {
        self.collaborators = collaborators;
    }

    pub fn key(&self) -> &NoteKey {
        &self.key
    }

    pub fn id(&self) -> Option<&NoteId> {
        self.key.id()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn draft(&self) -> NoteDraft {
        NoteDraft::new(self.title.clone(), self.content.clone())
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.owner.as_ref()
    }

    pub fn is_owner(&self, user: &UserId) -> bool {
        self.owner.as_ref() == Some(user)
    }

    pub fn collaborators(&self) -> &[Identity] {
        &self.collaborators
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
