//! # notely-collab: live sessions and API access for the notely client
//!
//! Talks to the notes server over two transports: the REST API for anything
//! persisted, and WebSocket channels for presence and live note events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   REST (reqwest)    ┌──────────────┐
//! │  NoteEditor  │ ──────────────────► │  Notes API   │
//! │  AuthSession │                     │ (authority)  │
//! └──────┬───────┘                     └──────────────┘
//!        │ one note channel + one identity channel
//!        ▼
//! ┌──────────────┐   WebSocket (JSON)  ┌──────────────┐
//! │SessionManager│ ◄─────────────────► │ Event relay  │
//! │IdentityChan. │                     │ (per note)   │
//! └──────────────┘                     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON event frames and the connection URL
//! - [`channel`]: WebSocket link tasks and the note-scoped channel
//! - [`session`]: at most one active note channel, switch-safe
//! - [`typing`]: outbound debounce and inbound "is typing" indicator
//! - [`identity`]: long-lived presence channel for the signed-in user
//! - [`membership`]: add / remove / leave collaborators
//! - [`api`]: REST client implementing [`notely_core::NoteStore`]
//! - [`auth`]: token storage and login state
//! - [`editor`]: the note editor controller
//! - [`config`]: client configuration

pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod editor;
pub mod identity;
pub mod membership;
pub mod protocol;
pub mod route;
pub mod session;
pub mod typing;

pub use api::{AuthGrant, Credentials, Registration, RestClient, SetupError};
pub use auth::{token_store, AuthError, AuthSession, FileTokenStore, MemoryTokenStore, TokenStore};
pub use channel::{ConnectionState, LoopbackPeer, NoteChannel};
pub use config::{ClientConfig, ConfigError};
pub use editor::NoteEditor;
pub use identity::IdentityChannel;
pub use membership::{search_users, MemberAction, MemberPolicy, Membership};
pub use protocol::{connection_url, ClientEvent, ProtocolError, ServerEvent, ServerFrame};
pub use route::Route;
pub use session::{dispatch, SessionEvent, SessionHooks, SessionManager};
pub use typing::{TypingDebounce, TypingIndicator, TYPING_TIMEOUT};
