mod config;
mod protocol;

use crate::config::Config;
use crate::protocol::{ClientMessage, ServerMessage};
use anyhow::Context;
use axum::{
    Router,
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    extract::{Path, State},
    response::Response,
    routing::get,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use interview_core::Command;
use interview_core::acquisition::{ResponseAcquirer, TextResponder};
use interview_core::coach::InterviewCoach;
use interview_core::profile::UserProfile;
use interview_core::prompts::{PromptSet, load_prompt_overrides};
use interview_core::question_bank::QuestionBank;
use interview_core::resume::clip_resume;
use interview_core::reviewer::{Reviewer, build_reviewer};
use interview_core::session_state::Session;
use interview_core::store::{InterviewStore, StoreResult, open_store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

/// Shared by every connection.
struct AppState {
    reviewer: Arc<dyn Reviewer>,
    bank: QuestionBank,
    store: Arc<dyn InterviewStore>,
    turn_budget: Duration,
}

/// What the socket writer task is asked to do.
enum Outgoing {
    Frame(ServerMessage),
    Close,
}

/// The interview currently running on a connection.
struct ActiveInterview {
    task: JoinHandle<()>,
    responder: TextResponder,
}

/// Handles WebSocket upgrade requests for one client.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket upgrade request received from {client_id}");
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn health() -> &'static str {
    "ok"
}

/// Creates an anonymous profile the first time a client id is seen.
async fn ensure_profile(store: &dyn InterviewStore, client_id: &str) -> StoreResult<()> {
    if store.load_profile(client_id).await?.is_some() {
        return Ok(());
    }
    let mut profile = UserProfile::anonymous(client_id);
    profile.email = "anonymous@example.com".to_string();
    profile.current_level = "mid".to_string();
    store.save_profile(&profile).await?;
    info!("Created anonymous profile for {client_id}");
    Ok(())
}

/// Serializes frames onto the socket until asked to close.
async fn write_frames(mut sender: SplitSink<WebSocket, Message>, mut out_rx: mpsc::Receiver<Outgoing>) {
    while let Some(outgoing) = out_rx.recv().await {
        let result = match outgoing {
            Outgoing::Frame(frame) => match serde_json::to_string(&frame) {
                Ok(text) => sender.send(Message::Text(text.into())).await,
                Err(e) => {
                    tracing::error!("Failed to serialize frame: {e}");
                    continue;
                }
            },
            Outgoing::Close => {
                let close = CloseFrame {
                    code: close_code::NORMAL,
                    reason: "Interview complete".into(),
                };
                let _ = sender.send(Message::Close(Some(close))).await;
                break;
            }
        };
        if let Err(e) = result {
            info!("WebSocket send failed: {e}");
            break;
        }
    }
}

/// Runs one interview, forwarding its commands as frames.
fn start_interview(
    state: &AppState,
    client_id: &str,
    interview_type: &str,
    level: &str,
    resume_text: &str,
    out_tx: mpsc::Sender<Outgoing>,
) -> ActiveInterview {
    let (responder, mut acquirer) = ResponseAcquirer::channel(None);
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);
    let mut session =
        Session::new(client_id, interview_type, level).with_resume(clip_resume(resume_text));
    let mut coach = InterviewCoach::new(
        state.reviewer.clone(),
        state.bank.clone(),
        state.store.clone(),
    )
    .with_turn_budget(state.turn_budget);

    info!(
        "Starting interview {} for {client_id}",
        session.interview_id
    );

    let task = tokio::spawn(async move {
        let run = async {
            let record = coach.run(&mut session, &mut acquirer, &command_tx).await;
            drop(command_tx);
            record
        };
        let forward = async {
            while let Some(command) = command_rx.recv().await {
                let Some(frame) = ServerMessage::from_command(command) else {
                    continue;
                };
                let last = frame.ends_interview();
                if out_tx.send(Outgoing::Frame(frame)).await.is_err() {
                    break;
                }
                if last {
                    let _ = out_tx.send(Outgoing::Close).await;
                }
            }
            // Dropping the receiver fails the coach's next emit.
            drop(command_rx);
        };

        let (record, ()) = tokio::join!(run, forward);
        match record {
            Some(record) => info!("Interview {} complete", record.interview_id),
            None => info!("Interview ended before closing"),
        }
    });

    ActiveInterview { task, responder }
}

/// Manages an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    info!("WebSocket connection established for {client_id}");

    let (sender, mut receiver) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<Outgoing>(32);
    let writer = tokio::spawn(write_frames(sender, out_rx));

    if let Err(e) = ensure_profile(state.store.as_ref(), &client_id).await {
        tracing::error!("Profile setup failed for {client_id}: {e}");
        let _ = out_tx
            .send(Outgoing::Frame(ServerMessage::error(e.to_string())))
            .await;
        let _ = out_tx.send(Outgoing::Close).await;
        let _ = writer.await;
        return;
    }

    let mut interview: Option<ActiveInterview> = None;

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                // Client disconnected.
                info!("WebSocket error: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::StartInterview {
                interview_type,
                level,
                resume_text,
            }) => {
                if interview.as_ref().is_some_and(|i| !i.task.is_finished()) {
                    Some(ServerMessage::error("An interview is already in progress"))
                } else {
                    interview = Some(start_interview(
                        &state,
                        &client_id,
                        &interview_type,
                        &level,
                        &resume_text,
                        out_tx.clone(),
                    ));
                    None
                }
            }
            Ok(ClientMessage::Response { response }) => {
                let accepted = match &interview {
                    Some(active) => active.responder.submit(response).await.is_ok(),
                    None => false,
                };
                if accepted {
                    Some(ServerMessage::ack())
                } else {
                    Some(ServerMessage::error("No interview in progress"))
                }
            }
            Err(e) => {
                tracing::warn!("Invalid message from {client_id}: {e}");
                Some(ServerMessage::error(format!("Invalid message: {e}")))
            }
        };

        if let Some(frame) = reply {
            if out_tx.send(Outgoing::Frame(frame)).await.is_err() {
                break;
            }
        }
    }

    // Disconnecting abandons the interview without persisting it.
    if let Some(active) = interview {
        if !active.task.is_finished() {
            info!("Client {client_id} left mid-interview, aborting");
        }
        active.task.abort();
    }
    writer.abort();
    info!("WebSocket connection closed for {client_id}");
}

/// The HTTP surface: one WebSocket route per client plus a health check.
fn app(state: Arc<AppState>) -> Router {
    // Configure a permissive CORS policy to allow connections from any origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{client_id}", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let prompts = if config.prompts_dir.is_dir() {
        let overrides =
            load_prompt_overrides(&config.prompts_dir).context("Failed to load LLM prompts")?;
        info!("Loaded {} prompt overrides.", overrides.len());
        PromptSet::default().with_overrides(overrides)
    } else {
        PromptSet::default()
    };

    let state = Arc::new(AppState {
        reviewer: build_reviewer(config.provider, config.reviewer_settings(), prompts)?,
        bank: QuestionBank::load(&config.question_banks_dir)
            .context("Failed to load question banks")?,
        store: open_store(config.store_backend, &config.storage_dir, &config.db_path)
            .context("Failed to open the interview store")?,
        turn_budget: config.response_timeout,
    });

    info!(
        "Starting WebSocket server, listening on {}",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app(state)).await?;

    Ok(())
}
