//! Presence channel keyed by the authenticated user.
//!
//! Opened once per login (or restored session) and closed on logout. It
//! carries no events of its own; only its lifecycle and status matter.

use std::time::Duration;

use notely_core::UserId;
use tokio::sync::watch;

use crate::channel::{ConnectionState, Link};
use crate::config::ClientConfig;
use crate::protocol::{connection_url, ProtocolError};

pub struct IdentityChannel {
    config: ClientConfig,
    link: Option<Link>,
    user: Option<UserId>,
}

impl IdentityChannel {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: None,
            user: None,
        }
    }

    /// Connect for `user`. A no-op while a channel is already open for the
    /// same user; a channel keyed to anyone else is closed first.
    ///
    /// Failures are logged, not returned; the channel stays closed and a
    /// later call tries again.
    pub async fn open(&mut self, user: &UserId) -> ConnectionState {
        if let Some(link) = &self.link {
            if self.user.as_ref() == Some(user) {
                log::debug!("Identity channel already open for user {user}");
                return link.state();
            }
            log::info!("Identity channel switching from {:?} to {user}", self.user);
            self.close().await;
        }

        match self.connect(user).await {
            Ok(link) => {
                log::info!("Identity channel open for user {user}");
                let state = link.state();
                self.link = Some(link);
                self.user = Some(user.clone());
                state
            }
            Err(e) => {
                log::warn!("Identity channel for user {user} failed: {e}");
                ConnectionState::Disconnected
            }
        }
    }

    async fn connect(&self, user: &UserId) -> Result<Link, ProtocolError> {
        let base = self
            .config
            .socket_url()
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        Link::connect(&connection_url(&base, user), self.config.channel_capacity).await
    }

    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.shutdown(self.close_timeout()).await;
            log::info!("Identity channel closed for user {:?}", self.user);
        }
        self.user = None;
    }

    fn close_timeout(&self) -> Duration {
        self.config.close_timeout
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.link
            .as_ref()
            .map_or(ConnectionState::Disconnected, Link::state)
    }

    pub fn subscribe_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.link.as_ref().map(Link::subscribe)
    }
}
