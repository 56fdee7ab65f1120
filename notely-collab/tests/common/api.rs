//! Throw-away notes REST API backed by `MemoryStore`.
//!
//! Implements the endpoints the client uses with bearer-token auth and
//! JSON `{ "message": ... }` error bodies, and logs every request line.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use notely_core::{Identity, MemoryStore, Note, NoteDraft, NoteId, NoteStore, StoreError, UserId};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

type ApiFailure = (StatusCode, Json<Value>);

struct Account {
    identity: Identity,
    password: String,
}

struct Inner {
    store: MemoryStore,
    accounts: Mutex<Vec<Account>>,
    tokens: Mutex<HashMap<String, Identity>>,
    requests: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct FakeApi {
    inner: Arc<Inner>,
    base_url: String,
}

impl FakeApi {
    pub async fn start() -> FakeApi {
        let system = Identity::new("system", "System", "system@localhost");
        let inner = Arc::new(Inner {
            store: MemoryStore::new(system),
            accounts: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let api = FakeApi {
            inner,
            base_url: format!("http://{addr}/api"),
        };

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/auth/check", get(check))
            .route("/api/users", get(list_users))
            .route("/api/notes", get(list_notes).post(create_note))
            .route("/api/notes/bulk-delete", post(bulk_delete))
            .route("/api/notes/{id}", get(get_note).put(update_note))
            .route(
                "/api/notes/{id}/collaborators",
                get(collaborators).post(add_collaborator),
            )
            .route("/api/notes/{id}/collaborators/{user_id}", delete(remove_collaborator))
            .route("/api/notes/{id}/leave", post(leave_note))
            .layer(middleware::from_fn_with_state(api.clone(), record))
            .with_state(api.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        api
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn add_account(&self, id: &str, name: &str, email: &str, password: &str) -> Identity {
        let identity = Identity::new(id, name, email);
        self.inner.store.register_user(identity.clone());
        self.inner.accounts.lock().unwrap().push(Account {
            identity: identity.clone(),
            password: password.to_string(),
        });
        identity
    }

    pub async fn add_note(&self, owner: &Identity, title: &str, content: &str) -> Note {
        self.inner
            .store
            .acting_as(owner.clone())
            .create_note(&NoteDraft::new(title, content))
            .await
            .unwrap()
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.inner.store.snapshot(id)
    }

    /// Request lines received so far, e.g. `GET /api/notes`.
    pub fn requests(&self) -> Vec<String> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().unwrap().len()
    }

    fn acting(&self, headers: &HeaderMap) -> Result<MemoryStore, ApiFailure> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "No token provided"))?;
        let identity = self
            .inner
            .tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Invalid token"))?;
        Ok(self.inner.store.acting_as(identity))
    }

    fn grant(&self, identity: Identity) -> Value {
        let token = Uuid::new_v4().to_string();
        self.inner
            .tokens
            .lock()
            .unwrap()
            .insert(token.clone(), identity.clone());
        json!({ "user": identity, "token": token })
    }
}

fn failure(status: StatusCode, message: &str) -> ApiFailure {
    (status, Json(json!({ "message": message })))
}

fn store_failure(e: StoreError) -> ApiFailure {
    match e {
        StoreError::Api { status, message } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            failure(status, message.as_deref().unwrap_or("Request failed"))
        }
        StoreError::NotFound => failure(StatusCode::NOT_FOUND, "Note not found"),
        other => failure(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}

async fn record(State(api): State<FakeApi>, request: Request, next: Next) -> Response {
    let line = format!("{} {}", request.method(), request.uri().path());
    api.inner.requests.lock().unwrap().push(line);
    next.run(request).await
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterBody {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct BulkDeleteBody {
    #[serde(rename = "noteIds")]
    note_ids: Vec<NoteId>,
}

#[derive(Deserialize)]
struct AddCollaboratorBody {
    #[serde(rename = "userId")]
    user_id: UserId,
}

async fn login(State(api): State<FakeApi>, Json(body): Json<LoginBody>) -> Result<Json<Value>, ApiFailure> {
    let identity = api
        .inner
        .accounts
        .lock()
        .unwrap()
        .iter()
        .find(|a| a.identity.email == body.email && a.password == body.password)
        .map(|a| a.identity.clone())
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "Invalid credentials"))?;
    Ok(Json(api.grant(identity)))
}

async fn register(
    State(api): State<FakeApi>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<Value>, ApiFailure> {
    let taken = api
        .inner
        .accounts
        .lock()
        .unwrap()
        .iter()
        .any(|a| a.identity.email == body.email);
    if taken {
        return Err(failure(StatusCode::BAD_REQUEST, "User already exists"));
    }
    let id = Uuid::new_v4().simple().to_string();
    let identity = api.add_account(&id, &body.name, &body.email, &body.password);
    Ok(Json(api.grant(identity)))
}

async fn check(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Identity>, ApiFailure> {
    Ok(Json(api.acting(&headers)?.acting().clone()))
}

async fn list_users(
    State(api): State<FakeApi>,
    headers: HeaderMap,
) -> Result<Json<Vec<Identity>>, ApiFailure> {
    api.acting(&headers)?;
    let users = api
        .inner
        .accounts
        .lock()
        .unwrap()
        .iter()
        .map(|a| a.identity.clone())
        .collect();
    Ok(Json(users))
}

async fn list_notes(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Vec<Note>>, ApiFailure> {
    let store = api.acting(&headers)?;
    store.list_notes().await.map(Json).map_err(store_failure)
}

async fn create_note(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(draft): Json<NoteDraft>,
) -> Result<Json<Note>, ApiFailure> {
    let store = api.acting(&headers)?;
    store.create_note(&draft).await.map(Json).map_err(store_failure)
}

async fn get_note(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiFailure> {
    let store = api.acting(&headers)?;
    store.get_note(&NoteId::new(id)).await.map(Json).map_err(store_failure)
}

async fn update_note(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(draft): Json<NoteDraft>,
) -> Result<Json<Value>, ApiFailure> {
    let store = api.acting(&headers)?;
    store
        .update_note(&NoteId::new(id), &draft)
        .await
        .map_err(store_failure)?;
    Ok(Json(json!({ "message": "Note updated" })))
}

async fn bulk_delete(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<BulkDeleteBody>,
) -> Result<Json<Value>, ApiFailure> {
    let store = api.acting(&headers)?;
    store.delete_notes(&body.note_ids).await.map_err(store_failure)?;
    Ok(Json(json!({ "message": "Notes deleted" })))
}

async fn collaborators(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Identity>>, ApiFailure> {
    let store = api.acting(&headers)?;
    store
        .collaborators(&NoteId::new(id))
        .await
        .map(Json)
        .map_err(store_failure)
}

async fn add_collaborator(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AddCollaboratorBody>,
) -> Result<Json<Vec<Identity>>, ApiFailure> {
    let store = api.acting(&headers)?;
    store
        .add_collaborator(&NoteId::new(id), &body.user_id)
        .await
        .map(Json)
        .map_err(store_failure)
}

async fn remove_collaborator(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Identity>>, ApiFailure> {
    let store = api.acting(&headers)?;
    store
        .remove_collaborator(&NoteId::new(id), &UserId::new(user_id))
        .await
        .map(Json)
        .map_err(store_failure)
}

async fn leave_note(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiFailure> {
    let store = api.acting(&headers)?;
    store.leave_note(&NoteId::new(id)).await.map_err(store_failure)?;
    Ok(Json(json!({ "message": "Left note" })))
}
