//! Collaborator membership operations.
//!
//! Each operation persists first, then updates the local projection with the
//! server's list, then tells peers via `collaboratorUpdated`. A failure
//! leaves local state alone and broadcasts nothing.

use notely_core::{
    Identity, NoteError, NoteId, NoteProjection, NoteStore, Notice, UserId, ValidationError,
};

use crate::route::Route;
use crate::session::SessionManager;

pub const ADD_FAILED: &str = "Error adding collaborator";
pub const REMOVE_FAILED: &str = "Error removing collaborator";
pub const LEAVE_FAILED: &str = "Error leaving note";
pub const LIST_UPDATED: &str = "Collaborator list updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Remove,
    Leave,
}

/// Which membership actions to offer next to a collaborator.
///
/// Only a hint for presentation; the server makes the real decision.
pub struct MemberPolicy;

impl MemberPolicy {
    pub fn actions(viewer: &UserId, owner: &UserId, collaborator: &UserId) -> Vec<MemberAction> {
        let mut actions = Vec::new();
        if viewer == owner && collaborator != owner {
            actions.push(MemberAction::Remove);
        }
        if viewer == collaborator && viewer != owner {
            actions.push(MemberAction::Leave);
        }
        actions
    }
}

/// Membership operations for the note a projection is bound to.
pub struct Membership<'a, S> {
    store: &'a S,
    session: &'a SessionManager,
}

impl<'a, S: NoteStore> Membership<'a, S> {
    pub fn new(store: &'a S, session: &'a SessionManager) -> Self {
        Self { store, session }
    }

    /// Add `user` (the one picked in the directory, if any).
    pub async fn add(
        &self,
        projection: &mut NoteProjection,
        user: Option<&UserId>,
    ) -> Result<Notice, Notice> {
        let Some(user) = user else {
            return Err(NoteError::from(ValidationError::NoUserSelected).notice(ADD_FAILED));
        };
        let note_id = bound_note(projection, ADD_FAILED)?;
        let collaborators = self
            .store
            .add_collaborator(&note_id, user)
            .await
            .map_err(|e| {
                log::warn!("Adding {user} to note {note_id} failed: {e}");
                e.notice(ADD_FAILED)
            })?;
        projection.set_collaborators(collaborators);
        self.session.collaborator_updated();
        log::info!("Added collaborator {user} to note {note_id}");
        Ok(Notice::success("Collaborator added"))
    }

    pub async fn remove(&self, projection: &mut NoteProjection, user: &UserId) -> Result<Notice, Notice> {
        let note_id = bound_note(projection, REMOVE_FAILED)?;
        let collaborators = self
            .store
            .remove_collaborator(&note_id, user)
            .await
            .map_err(|e| {
                log::warn!("Removing {user} from note {note_id} failed: {e}");
                e.notice(REMOVE_FAILED)
            })?;
        projection.set_collaborators(collaborators);
        self.session.collaborator_updated();
        log::info!("Removed collaborator {user} from note {note_id}");
        Ok(Notice::success("Collaborator removed"))
    }

    /// Leave the note; on success the caller should navigate to the dashboard.
    pub async fn leave(&self, projection: &NoteProjection) -> Result<Route, Notice> {
        let note_id = bound_note(projection, LEAVE_FAILED)?;
        self.store.leave_note(&note_id).await.map_err(|e| {
            log::warn!("Leaving note {note_id} failed: {e}");
            e.notice(LEAVE_FAILED)
        })?;
        self.session.collaborator_updated();
        log::info!("Left note {note_id}");
        Ok(Route::Dashboard)
    }

    /// A peer changed membership: re-fetch the list and return the notice to show.
    pub async fn refresh(&self, projection: &mut NoteProjection, message: Option<&str>) -> Notice {
        if let Some(note_id) = projection.id().cloned() {
            match self.store.collaborators(&note_id).await {
                Ok(collaborators) => projection.set_collaborators(collaborators),
                Err(e) => log::warn!("Refreshing collaborators of note {note_id} failed: {e}"),
            }
        }
        Notice::success(message.filter(|m| !m.trim().is_empty()).unwrap_or(LIST_UPDATED))
    }
}

fn bound_note(projection: &NoteProjection, fallback: &str) -> Result<NoteId, Notice> {
    projection.id().cloned().ok_or_else(|| {
        log::debug!("Membership change on an unsaved note");
        Notice::error(fallback)
    })
}

/// Directory entries matching `query` on name or email, case-insensitively.
pub fn search_users<'u>(users: &'u [Identity], query: &str) -> Vec<&'u Identity> {
    users.iter().filter(|u| u.matches(query)).collect()
}
