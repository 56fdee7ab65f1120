use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::model::{Note, NoteId, UserId};
use crate::store::NoteStore;

pub const FETCH_FAILED: &str = "Failed to fetch notes";

/// The note list shown after login, plus the bulk-delete selection.
#[derive(Debug, Default)]
pub struct Dashboard {
    notes: Vec<Note>,
    selected: BTreeSet<NoteId>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with exactly what the store returns.
    pub async fn refresh<S: NoteStore>(&mut self, store: &S) -> Result<&[Note], StoreError> {
        let notes = store.list_notes().await?;
        log::debug!("Dashboard refreshed: {} notes", notes.len());
        self.notes = notes;
        let notes = &self.notes;
        self.selected.retain(|id| notes.iter().any(|n| &n.id == id));
        Ok(&self.notes)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Toggle a note in the delete selection. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &NoteId) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.clone());
            true
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &NoteId> {
        self.selected.iter()
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Bulk-delete the selection. The local list only changes on success.
    ///
    /// Returns the number of notes removed from the list; an empty selection
    /// is a no-op without a store call.
    pub async fn delete_selected<S: NoteStore>(&mut self, store: &S) -> Result<usize, StoreError> {
        if self.selected.is_empty() {
            return Ok(0);
        }
        let ids: Vec<NoteId> = self.selected.iter().cloned().collect();
        store.delete_notes(&ids).await?;

        let before = self.notes.len();
        self.notes.retain(|n| !ids.contains(&n.id));
        self.selected.clear();
        log::info!("Deleted {} notes", ids.len());
        Ok(before - self.notes.len())
    }

    /// Delete is only offered to the owner.
    pub fn can_delete(viewer: &UserId, note: &Note) -> bool {
        note.is_owned_by(viewer)
    }
}
