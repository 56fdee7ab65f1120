//! HTTP client for the notes REST API.
//!
//! Every request picks up the current token from the shared [`TokenStore`],
//! so logging in or out takes effect on the next call without rebuilding
//! the client.

use std::sync::Arc;

use notely_core::{Identity, Note, NoteDraft, NoteId, NoteStore, StoreError, UserId};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::TokenStore;
use crate::config::{ClientConfig, ConfigError};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

/// `POST /auth/login` body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register` body.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

/// Response of login and register.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    pub user: Identity,
    pub token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Serialize)]
struct BulkDelete<'a> {
    #[serde(rename = "noteIds")]
    note_ids: &'a [NoteId],
}

#[derive(Serialize)]
struct AddCollaborator<'a> {
    #[serde(rename = "userId")]
    user_id: &'a UserId,
}

#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: String,
    tokens: Arc<dyn TokenStore>,
}

impl RestClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, SetupError> {
        let base = config.api_url()?.as_str().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SetupError::Http(e.to_string()))?;
        Ok(Self { http, base, tokens })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{path}", self.base));
        match self.tokens.load() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, StoreError> {
        let request = self.request(Method::POST, "/auth/login").json(credentials);
        decode(send(request).await?).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthGrant, StoreError> {
        let request = self.request(Method::POST, "/auth/register").json(registration);
        decode(send(request).await?).await
    }

    /// `GET /auth/check`: the identity behind the current token.
    pub async fn check(&self) -> Result<Identity, StoreError> {
        decode(send(self.request(Method::GET, "/auth/check")).await?).await
    }

    /// `GET /users`
    pub async fn list_users(&self) -> Result<Vec<Identity>, StoreError> {
        decode(send(self.request(Method::GET, "/users")).await?).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message);
    log::debug!("Request failed with {status}: {message:?}");
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

impl NoteStore for RestClient {
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        decode(send(self.request(Method::GET, "/notes")).await?).await
    }

    async fn get_note(&self, id: &NoteId) -> Result<Note, StoreError> {
        let response = send(self.request(Method::GET, &format!("/notes/{id}")))
            .await
            .map_err(|e| match e {
                StoreError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                    StoreError::NotFound
                }
                other => other,
            })?;
        decode(response).await
    }

    async fn create_note(&self, draft: &NoteDraft) -> Result<Note, StoreError> {
        decode(send(self.request(Method::POST, "/notes").json(draft)).await?).await
    }

    async fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<(), StoreError> {
        send(self.request(Method::PUT, &format!("/notes/{id}")).json(draft)).await?;
        Ok(())
    }

    async fn delete_notes(&self, ids: &[NoteId]) -> Result<(), StoreError> {
        let body = BulkDelete { note_ids: ids };
        send(self.request(Method::POST, "/notes/bulk-delete").json(&body)).await?;
        Ok(())
    }

    async fn collaborators(&self, id: &NoteId) -> Result<Vec<Identity>, StoreError> {
        decode(send(self.request(Method::GET, &format!("/notes/{id}/collaborators"))).await?).await
    }

    async fn add_collaborator(&self, id: &NoteId, user: &UserId) -> Result<Vec<Identity>, StoreError> {
        let body = AddCollaborator { user_id: user };
        let request = self
            .request(Method::POST, &format!("/notes/{id}/collaborators"))
            .json(&body);
        decode(send(request).await?).await
    }

    async fn remove_collaborator(
        &self,
        id: &NoteId,
        user: &UserId,
    ) -> Result<Vec<Identity>, StoreError> {
        let path = format!("/notes/{id}/collaborators/{user}");
        decode(send(self.request(Method::DELETE, &path)).await?).await
    }

    async fn leave_note(&self, id: &NoteId) -> Result<(), StoreError> {
        send(self.request(Method::POST, &format!("/notes/{id}/leave"))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ClientConfig {
            api_base_url: "http://localhost:5000/api/".into(),
            ..ClientConfig::default()
        };
        let client = RestClient::new(&config, Arc::new(MemoryTokenStore::default())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig {
            api_base_url: "nope".into(),
            ..ClientConfig::default()
        };
        let result = RestClient::new(&config, Arc::new(MemoryTokenStore::default()));
        assert!(matches!(result, Err(SetupError::Config(_))));
    }

    #[test]
    fn test_request_bodies() {
        let ids = [NoteId::new("a"), NoteId::new("b")];
        let body = serde_json::to_value(BulkDelete { note_ids: &ids }).unwrap();
        assert_eq!(body, serde_json::json!({"noteIds": ["a", "b"]}));

        let user = UserId::new("u2");
        let body = serde_json::to_value(AddCollaborator { user_id: &user }).unwrap();
        assert_eq!(body, serde_json::json!({"userId": "u2"}));
    }
}
