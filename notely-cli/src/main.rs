use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;
use notely_collab::{
    token_store, AuthError, AuthSession, ClientConfig, Credentials, NoteEditor, Registration,
    Route, SessionHooks, SessionManager,
};
use notely_collab::editor::{DELETE_FAILED, LOAD_FAILED};
use notely_core::{
    Dashboard, Field, Identity, NoteDraft, NoteId, NoteStore, Notice, StoreError, FETCH_FAILED,
};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "notely")]
#[command(about = "Command-line client for a notely server")]
struct Cli {
    /// Where the auth token is kept between runs
    #[arg(long, global = true)]
    token_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
    /// List the notes you own or collaborate on
    Notes,
    Show {
        id: String,
    },
    New {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete notes you own
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Add a collaborator by user id
    Share {
        id: String,
        user: String,
    },
    Unshare {
        id: String,
        user: String,
    },
    Leave {
        id: String,
    },
    /// Follow live activity on a note until interrupted
    Watch {
        id: String,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Not signed in, run `notely login` first")]
    SignedOut,
    #[error("{0}")]
    Rejected(String),
}

/// Print success notices; the first error notice fails the command.
fn report(notices: Vec<Notice>) -> Result<(), CliError> {
    for notice in notices {
        if notice.is_error() {
            return Err(CliError::Rejected(notice.text));
        }
        println!("{}", notice.text);
    }
    Ok(())
}

fn rejected(error: &StoreError, fallback: &str) -> CliError {
    log::debug!("{error}");
    CliError::Rejected(error.notice(fallback).text)
}

fn default_token_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".notely").join("token"),
        None => PathBuf::from(".notely-token"),
    }
}

/// Mount an existing note, failing the command when it could not be loaded.
async fn mount_note<S: NoteStore>(editor: &mut NoteEditor<S>, id: String) -> Result<(), CliError> {
    editor.mount(&Route::Note(NoteId::new(id))).await;
    if editor.is_mounted() {
        return Ok(());
    }
    report(editor.take_notices())?;
    Err(CliError::Rejected(LOAD_FAILED.to_string()))
}

async fn signed_in(auth: &mut AuthSession) -> Result<Identity, CliError> {
    auth.check_auth().await.cloned().ok_or(CliError::SignedOut)
}

struct Printer;

impl SessionHooks for Printer {
    fn on_peer_typing(&mut self, name: &str) {
        println!("{name} is typing...");
    }

    fn on_peer_stop_typing(&mut self) {
        println!("(stopped typing)");
    }

    fn on_note_broadcast(&mut self, draft: &NoteDraft) {
        println!("--- {} ---\n{}", draft.title, draft.content);
    }

    fn on_membership_changed(&mut self, message: Option<&str>) {
        println!("{}", message.unwrap_or("Collaborator list updated"));
    }

    fn on_connection_lost(&mut self) {
        println!("Connection lost");
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env();
    if let Some(path) = cli.token_path {
        config.token_path = Some(path);
    } else if config.token_path.is_none() {
        config.token_path = Some(default_token_path());
    }
    let mut auth = AuthSession::new(&config, token_store(&config))?;

    match cli.command {
        Command::Login { email, password } => {
            let notice = auth.login(&Credentials { email, password }).await?;
            report(vec![notice])
        }
        Command::Register {
            name,
            email,
            phone,
            password,
        } => {
            let registration = Registration {
                name,
                email,
                phone,
                password,
            };
            let notice = auth.register(&registration).await?;
            report(vec![notice])
        }
        Command::Logout => {
            let notice = auth.logout().await;
            report(vec![notice])
        }
        Command::Whoami => {
            let me = signed_in(&mut auth).await?;
            println!("{} <{}> ({})", me.name, me.email, me.id);
            Ok(())
        }
        Command::Notes => {
            let me = signed_in(&mut auth).await?;
            let mut dashboard = Dashboard::new();
            let notes = dashboard
                .refresh(auth.api())
                .await
                .map_err(|e| rejected(&e, FETCH_FAILED))?;
            for note in notes {
                let role = if note.is_owned_by(&me.id) { "owner" } else { "shared" };
                println!("{}\t{}\t{role}", note.id, note.title);
            }
            Ok(())
        }
        Command::Show { id } => {
            signed_in(&mut auth).await?;
            let note = auth.api().get_note(&NoteId::new(id)).await?;
            println!("# {}", note.title);
            println!("owner: {} <{}>", note.owner.name, note.owner.email);
            for c in &note.collaborators {
                println!("collaborator: {} <{}>", c.name, c.email);
            }
            println!("\n{}", note.content);
            Ok(())
        }
        Command::New { title, content } => {
            let me = signed_in(&mut auth).await?;
            let mut editor = NoteEditor::new(auth.api().clone(), me, config);
            editor.mount(&Route::NewNote).await;
            editor.edit(Field::Title, title);
            editor.edit(Field::Content, content);
            let route = editor.save().await;
            editor.unmount().await;
            report(editor.take_notices())?;
            if let Some(route) = route {
                println!("{route}");
            }
            Ok(())
        }
        Command::Edit { id, title, content } => {
            let me = signed_in(&mut auth).await?;
            let mut editor = NoteEditor::new(auth.api().clone(), me, config);
            mount_note(&mut editor, id).await?;
            if let Some(title) = title {
                editor.edit(Field::Title, title);
            }
            if let Some(content) = content {
                editor.edit(Field::Content, content);
            }
            editor.save().await;
            editor.unmount().await;
            report(editor.take_notices())
        }
        Command::Delete { ids } => {
            let me = signed_in(&mut auth).await?;
            let mut dashboard = Dashboard::new();
            dashboard
                .refresh(auth.api())
                .await
                .map_err(|e| rejected(&e, FETCH_FAILED))?;
            for id in ids.into_iter().map(NoteId::new) {
                let owned = dashboard
                    .notes()
                    .iter()
                    .any(|n| n.id == id && Dashboard::can_delete(&me.id, n));
                if owned {
                    dashboard.toggle(&id);
                } else {
                    log::warn!("Skipping note {id}: not found or not yours");
                }
            }
            let removed = dashboard
                .delete_selected(auth.api())
                .await
                .map_err(|e| rejected(&e, DELETE_FAILED))?;
            println!("Deleted {removed} notes");
            Ok(())
        }
        Command::Share { id, user } => {
            let me = signed_in(&mut auth).await?;
            let mut editor = NoteEditor::new(auth.api().clone(), me, config);
            mount_note(&mut editor, id).await?;
            editor.select_user(Some(user.as_str().into()));
            editor.add_collaborator().await;
            editor.unmount().await;
            report(editor.take_notices())
        }
        Command::Unshare { id, user } => {
            let me = signed_in(&mut auth).await?;
            let mut editor = NoteEditor::new(auth.api().clone(), me, config);
            mount_note(&mut editor, id).await?;
            editor.remove_collaborator(&user.as_str().into()).await;
            editor.unmount().await;
            report(editor.take_notices())
        }
        Command::Leave { id } => {
            let me = signed_in(&mut auth).await?;
            let mut editor = NoteEditor::new(auth.api().clone(), me, config);
            mount_note(&mut editor, id).await?;
            editor.leave().await;
            editor.unmount().await;
            report(editor.take_notices())
        }
        Command::Watch { id } => {
            let me = signed_in(&mut auth).await?;
            let mut session = SessionManager::new(config);
            let state = session.open(NoteId::new(id.clone()), &me).await;
            info!("Watching note {id} ({state:?})");
            let mut printer = Printer;
            tokio::select! {
                _ = session.pump(&mut printer) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
            session.close().await;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
