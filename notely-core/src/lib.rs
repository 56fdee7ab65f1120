//! # notely-core: data model and note state for the notely client
//!
//! The REST API is the source of truth. This crate holds what the client
//! keeps locally between requests:
//!
//! - [`model`]: identities, notes, drafts and their ids
//! - [`store`]: the [`NoteStore`] persistence seam and an in-memory store
//! - [`projection`]: the editor's view of one note
//! - [`dashboard`]: the note list and bulk-delete selection
//! - [`error`]: validation/persistence errors and user-visible notices

pub mod dashboard;
pub mod error;
pub mod model;
pub mod projection;
pub mod store;

pub use dashboard::{Dashboard, FETCH_FAILED};
pub use error::{Notice, NoticeLevel, NoteError, StoreError, ValidationError};
pub use model::{Identity, Note, NoteDraft, NoteId, UserId, PLACEHOLDER_TITLE};
pub use projection::{Field, NoteKey, NoteProjection, SaveOutcome};
pub use store::{MemoryStore, NoteStore};
