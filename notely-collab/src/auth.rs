//! Authentication state: the token, the current identity and the identity
//! channel that lives as long as the login does.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notely_core::{Identity, Notice, StoreError};
use thiserror::Error;

use crate::api::{AuthGrant, Credentials, Registration, RestClient, SetupError};
use crate::config::ClientConfig;
use crate::identity::IdentityChannel;
use crate::route::Route;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Token storage failed: {0}")]
    Token(String),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl AuthError {
    pub fn notice(&self, fallback: &str) -> Notice {
        match self {
            AuthError::Invalid(reason) => Notice::error(*reason),
            AuthError::Store(e) => e.notice(fallback),
            AuthError::Token(_) | AuthError::Setup(_) => Notice::error(fallback),
        }
    }
}

/// Durable home of the auth token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok()?.clone()
    }

    fn save(&self, token: &str) -> Result<(), AuthError> {
        let mut slot = self.token.lock().map_err(|e| AuthError::Token(e.to_string()))?;
        *slot = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut slot = self.token.lock().map_err(|e| AuthError::Token(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Token kept in a single file, surviving restarts.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let token = fs::read_to_string(&self.path).ok()?;
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn save(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthError::Token(e.to_string()))?;
        }
        fs::write(&self.path, token).map_err(|e| AuthError::Token(e.to_string()))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Token(e.to_string())),
        }
    }
}

/// File-backed when the config names a path, in-memory otherwise.
pub fn token_store(config: &ClientConfig) -> Arc<dyn TokenStore> {
    match &config.token_path {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => Arc::new(MemoryTokenStore::default()),
    }
}

impl Credentials {
    pub fn validate(&self) -> Result<(), AuthError> {
        if !looks_like_email(&self.email) {
            return Err(AuthError::Invalid("Invalid email address"));
        }
        if self.password.chars().count() < 6 {
            return Err(AuthError::Invalid("Password must be at least 6 characters"));
        }
        Ok(())
    }
}

impl Registration {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.name.trim().chars().count() < 2 {
            return Err(AuthError::Invalid("Name must be at least 2 characters"));
        }
        if !looks_like_email(&self.email) {
            return Err(AuthError::Invalid("Enter a valid email"));
        }
        if self.phone.trim().chars().count() < 10 {
            return Err(AuthError::Invalid("Phone number is required"));
        }
        if self.password.chars().count() < 6 {
            return Err(AuthError::Invalid("Password must be at least 6 characters"));
        }
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub struct AuthSession {
    api: RestClient,
    tokens: Arc<dyn TokenStore>,
    identity: Option<Identity>,
    channel: IdentityChannel,
}

impl AuthSession {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, AuthError> {
        let api = RestClient::new(config, Arc::clone(&tokens))?;
        Ok(Self {
            api,
            tokens,
            identity: None,
            channel: IdentityChannel::new(config.clone()),
        })
    }

    /// Client sharing this session's token.
    pub fn api(&self) -> &RestClient {
        &self.api
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn identity_channel(&self) -> &IdentityChannel {
        &self.channel
    }

    pub fn has_token(&self) -> bool {
        self.tokens.load().is_some()
    }

    /// The signed-in identity, or where to send an anonymous visitor.
    pub fn require_identity(&self) -> Result<&Identity, Route> {
        self.identity.as_ref().ok_or(Route::Login)
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<Notice, AuthError> {
        credentials.validate()?;
        let grant = self.api.login(credentials).await?;
        self.establish(grant).await?;
        Ok(Notice::success("Login successful"))
    }

    pub async fn register(&mut self, registration: &Registration) -> Result<Notice, AuthError> {
        registration.validate()?;
        let grant = self.api.register(registration).await?;
        self.establish(grant).await?;
        Ok(Notice::success("Account created"))
    }

    async fn establish(&mut self, grant: AuthGrant) -> Result<(), AuthError> {
        self.tokens.save(&grant.token)?;
        log::info!("Signed in as {} ({})", grant.user.name, grant.user.id);
        self.channel.open(&grant.user.id).await;
        self.identity = Some(grant.user);
        Ok(())
    }

    /// Forget the token and identity and close the identity channel.
    pub async fn logout(&mut self) -> Notice {
        if let Err(e) = self.tokens.clear() {
            log::warn!("Failed to clear token: {e}");
        }
        self.channel.close().await;
        if let Some(identity) = self.identity.take() {
            log::info!("Signed out {}", identity.id);
        }
        Notice::success("Logged out")
    }

    /// Restore the session from a stored token.
    ///
    /// Without a token nothing is requested. A rejected token is discarded.
    pub async fn check_auth(&mut self) -> Option<&Identity> {
        if self.tokens.load().is_none() {
            self.identity = None;
            return None;
        }
        match self.api.check().await {
            Ok(identity) => {
                self.channel.open(&identity.id).await;
                self.identity = Some(identity);
            }
            Err(e) => {
                log::info!("Stored token rejected: {e}");
                self.identity = None;
                if let Err(e) = self.tokens.clear() {
                    log::warn!("Failed to clear token: {e}");
                }
            }
        }
        self.identity.as_ref()
    }
}
