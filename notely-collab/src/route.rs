use std::fmt;

use notely_core::NoteId;

/// Where the client should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    NewNote,
    Note(NoteId),
}

impl Route {
    /// `new` addresses the unsaved-note editor, anything else an existing note.
    pub fn for_note(segment: &str) -> Self {
        match segment {
            "new" => Route::NewNote,
            id => Route::Note(NoteId::new(id)),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => f.write_str("/login"),
            Route::Dashboard => f.write_str("/dashboard"),
            Route::NewNote => f.write_str("/note/new"),
            Route::Note(id) => write!(f, "/note/{id}"),
        }
    }
}
