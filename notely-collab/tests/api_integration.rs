//! Integration tests for the REST client, auth session and editor against a
//! real HTTP server and a real WebSocket relay.

mod common;

use std::sync::Arc;

use common::api::FakeApi;
use common::relay::Relay;
use notely_collab::{
    AuthSession, ClientConfig, ClientEvent, Credentials, FileTokenStore, MemberAction,
    MemoryTokenStore, NoteEditor, Registration, RestClient, Route, TokenStore,
};
use notely_core::{Dashboard, Field, Identity, NoteId, NoteStore, Notice, StoreError};

struct Harness {
    api: FakeApi,
    relay: Relay,
    alice: Identity,
    bob: Identity,
}

impl Harness {
    async fn start() -> Harness {
        let api = FakeApi::start().await;
        let relay = Relay::start().await;
        let alice = api.add_account("u1", "Alice", "alice@example.com", "secret1");
        let bob = api.add_account("u2", "Bob", "bob@example.com", "secret2");
        Harness { api, relay, alice, bob }
    }

    fn config(&self) -> ClientConfig {
        common::config(self.api.base_url(), &self.relay.url())
    }

    async fn login(&self, email: &str, password: &str) -> AuthSession {
        let mut session =
            AuthSession::new(&self.config(), Arc::new(MemoryTokenStore::default())).unwrap();
        session
            .login(&Credentials {
                email: email.into(),
                password: password.into(),
            })
            .await
            .unwrap();
        session
    }
}

#[tokio::test]
async fn test_login_dashboard_and_create_flow() {
    let h = Harness::start().await;
    let mine = h.api.add_note(&h.alice, "Groceries", "milk").await;
    h.api.add_note(&h.bob, "Private", "not shared").await;

    let auth = h.login("alice@example.com", "secret1").await;
    let identity = auth.require_identity().unwrap().clone();
    assert_eq!(identity, h.alice);

    // Dashboard shows exactly what GET /notes returns.
    let mut dashboard = Dashboard::new();
    let listed: Vec<NoteId> = dashboard
        .refresh(auth.api())
        .await
        .unwrap()
        .iter()
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(listed, vec![mine.id.clone()]);

    let mut editor = NoteEditor::new(auth.api().clone(), identity, h.config());
    editor.mount(&Route::NewNote).await;

    // "Untitled" with no content is rejected before any request.
    let before = h.api.request_count();
    assert_eq!(editor.save().await, None);
    assert_eq!(editor.take_notices(), vec![Notice::error("Cannot save empty note")]);
    assert_eq!(h.api.request_count(), before);

    editor.edit(Field::Content, "x");
    let route = editor.save().await.expect("created note should navigate");
    let Route::Note(id) = route else {
        panic!("expected a note route, got {route:?}");
    };
    assert_eq!(editor.note_id(), Some(&id));
    assert_eq!(h.api.note(&id).unwrap().content, "x");
    assert!(h.api.requests().contains(&"POST /api/notes".to_string()));

    // The editor now has a live channel for the new note.
    assert!(h.relay.wait_until(|r| r.room_size(id.as_str()) == 1).await);
}

#[tokio::test]
async fn test_logout_then_check_auth_makes_no_request() {
    let h = Harness::start().await;
    let mut auth = h.login("alice@example.com", "secret1").await;
    assert!(auth.identity_channel().is_open());
    assert!(h.relay.wait_until(|r| r.connected_users().contains(&"u1".to_string())).await);

    auth.logout().await;
    assert!(!auth.has_token());
    assert!(!auth.identity_channel().is_open());
    assert!(auth.identity().is_none());
    assert!(h.relay.wait_until(|r| r.connected_users().is_empty()).await);

    let before = h.api.request_count();
    assert!(auth.check_auth().await.is_none());
    assert_eq!(h.api.request_count(), before);
    assert_eq!(auth.require_identity().unwrap_err(), Route::Login);
}

#[tokio::test]
async fn test_session_restored_from_token_file() {
    let h = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token");

    let mut first = AuthSession::new(&h.config(), Arc::new(FileTokenStore::new(&path))).unwrap();
    first
        .login(&Credentials {
            email: "bob@example.com".into(),
            password: "secret2".into(),
        })
        .await
        .unwrap();

    let mut restored = AuthSession::new(&h.config(), Arc::new(FileTokenStore::new(&path))).unwrap();
    assert_eq!(restored.check_auth().await, Some(&h.bob));
    assert!(restored.identity_channel().is_open());
    assert!(h.api.requests().contains(&"GET /api/auth/check".to_string()));
}

#[tokio::test]
async fn test_rejected_token_is_discarded() {
    let h = Harness::start().await;
    let tokens = Arc::new(MemoryTokenStore::with_token("forged"));
    let mut auth = AuthSession::new(&h.config(), tokens.clone()).unwrap();

    assert!(auth.check_auth().await.is_none());
    assert_eq!(tokens.load(), None);
    assert!(!auth.identity_channel().is_open());
}

#[tokio::test]
async fn test_login_failure_uses_server_message() {
    let h = Harness::start().await;
    let mut auth = AuthSession::new(&h.config(), Arc::new(MemoryTokenStore::default())).unwrap();
    let err = auth
        .login(&Credentials {
            email: "alice@example.com".into(),
            password: "wrong-password".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.notice("Login failed").text, "Invalid credentials");
    assert!(!auth.has_token());
}

#[tokio::test]
async fn test_register_signs_in() {
    let h = Harness::start().await;
    let mut auth = AuthSession::new(&h.config(), Arc::new(MemoryTokenStore::default())).unwrap();
    let notice = auth
        .register(&Registration {
            name: "Carol".into(),
            email: "carol@example.com".into(),
            phone: "0123456789".into(),
            password: "secret3".into(),
        })
        .await
        .unwrap();
    assert_eq!(notice, Notice::success("Account created"));
    assert_eq!(auth.identity().map(|i| i.name.as_str()), Some("Carol"));
    assert!(auth.has_token());
}

#[tokio::test]
async fn test_missing_note_is_not_found() {
    let h = Harness::start().await;
    let auth = h.login("alice@example.com", "secret1").await;
    let result = auth.api().get_note(&NoteId::new("note-404")).await;
    assert_eq!(result.unwrap_err(), StoreError::NotFound);
}

#[tokio::test]
async fn test_unauthenticated_request_is_api_error() {
    let h = Harness::start().await;
    let client = RestClient::new(&h.config(), Arc::new(MemoryTokenStore::default())).unwrap();
    match client.list_notes().await {
        Err(StoreError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message.as_deref(), Some("No token provided"));
        }
        other => panic!("expected 401, got {other:?}"),
    }
}

#[tokio::test]
async fn test_collaboration_between_two_editors() {
    let h = Harness::start().await;
    let note = h.api.add_note(&h.alice, "Trip", "").await;
    let route = Route::Note(note.id.clone());

    let alice_auth = h.login("alice@example.com", "secret1").await;
    let mut alice = NoteEditor::new(alice_auth.api().clone(), h.alice.clone(), h.config());
    alice.set_directory(alice_auth.api().list_users().await.unwrap());
    alice.mount(&route).await;

    let picked = alice.search("bob@")[0].id.clone();
    alice.select_user(Some(picked));
    alice.add_collaborator().await;
    assert_eq!(alice.take_notices(), vec![Notice::success("Collaborator added")]);
    assert_eq!(alice.member_actions(&h.bob.id), vec![MemberAction::Remove]);

    let bob_auth = h.login("bob@example.com", "secret2").await;
    let mut bob = NoteEditor::new(bob_auth.api().clone(), h.bob.clone(), h.config());
    bob.mount(&route).await;
    assert!(h.relay.wait_until(|r| r.room_size(note.id.as_str()) == 2).await);
    assert_eq!(bob.member_actions(&h.bob.id), vec![MemberAction::Leave]);
    assert!(bob.member_actions(&h.alice.id).is_empty());

    // Bob is never offered Remove; calling it anyway is refused by the API.
    bob.remove_collaborator(&h.bob.id).await;
    assert_eq!(
        bob.take_notices(),
        vec![Notice::error("Only the owner can remove collaborators")]
    );
    assert_eq!(bob.projection().unwrap().collaborators(), &[h.bob.clone()]);

    // Bob saves; Alice's editor takes the broadcast.
    bob.edit(Field::Content, "pack sunscreen");
    assert_eq!(bob.save().await, None);
    while alice.projection().unwrap().content() != "pack sunscreen" {
        assert!(tokio::time::timeout(std::time::Duration::from_secs(2), alice.step())
            .await
            .unwrap());
    }

    // Bob leaves; Alice re-fetches the list on the membership broadcast.
    assert_eq!(bob.leave().await, Some(Route::Dashboard));
    assert!(h
        .relay
        .events_from("u2")
        .contains(&ClientEvent::CollaboratorUpdated { note_id: note.id.clone() }));
    while !alice.projection().unwrap().collaborators().is_empty() {
        assert!(tokio::time::timeout(std::time::Duration::from_secs(2), alice.step())
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_add_unknown_user_shows_server_message() {
    let h = Harness::start().await;
    let note = h.api.add_note(&h.alice, "Solo", "text").await;
    let auth = h.login("alice@example.com", "secret1").await;
    let mut editor = NoteEditor::new(auth.api().clone(), h.alice.clone(), h.config());
    editor.mount(&Route::Note(note.id.clone())).await;

    editor.add_collaborator().await;
    assert_eq!(editor.take_notices(), vec![Notice::error("Please select a user")]);

    editor.select_user(Some("ghost".into()));
    editor.add_collaborator().await;
    assert_eq!(editor.take_notices(), vec![Notice::error("User not found")]);
    assert!(editor.projection().unwrap().collaborators().is_empty());
    assert!(!h
        .relay
        .events_from("u1")
        .iter()
        .any(|e| matches!(e, ClientEvent::CollaboratorUpdated { .. })));
}
