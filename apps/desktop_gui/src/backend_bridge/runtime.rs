//! Backend worker: owns the tokio runtime and every async collaborator,
//! feeding state changes to the egui thread over a bounded channel.

use std::{sync::Arc, thread};

use client_core::{
    rest::{RestIdentityProvider, RestObjectStore},
    GridController, GridEvent, LogBuffer, LogEvent, SessionEvent, SessionManager, Settings,
    SlotStore,
};
use crossbeam_channel::{Receiver, Sender};
use shared::domain::SlotIndex;
use tokio::sync::broadcast::error::RecvError;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{decode_preview, friendly_startup_message, UiEvent};

pub fn launch(
    settings: anyhow::Result<Settings>,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) {
    thread::spawn(move || {
        let settings = match settings {
            Ok(settings) => settings,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::StartupFailed(friendly_startup_message(
                    &format!("{err:#}"),
                )));
                tracing::error!("backend configuration unusable: {err:#}");
                return;
            }
        };
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::StartupFailed(friendly_startup_message(
                    &format!("failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(run_worker(settings, cmd_rx, ui_tx));
    });
}

async fn run_worker(
    settings: Settings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) {
    let log = LogBuffer::new();
    let identity = Arc::new(RestIdentityProvider::new(&settings));
    let store = Arc::new(RestObjectStore::new(&settings));

    let session = SessionManager::new(identity, log.clone());
    session.initialize().await;
    let slots = SlotStore::new(store, Arc::clone(&session), log.clone());
    let grid = GridController::new(slots, Arc::clone(&session), log.clone());
    grid.attach_session_resync().await;

    spawn_forwarders(&grid, &session, &log, &ui_tx);

    let _ = ui_tx.try_send(UiEvent::BackendReady);
    let _ = ui_tx.try_send(UiEvent::SessionChanged(session.principal().await));
    grid.load().await;

    let http = reqwest::Client::new();
    // crossbeam recv blocks a runtime worker; the multi-thread runtime keeps
    // the forwarder tasks running on its other workers meanwhile
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            BackendCommand::LoadWall => grid.load().await,
            BackendCommand::UploadSlot { slot, path } => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let _ = grid.upload(slot, bytes).await;
                }
                Err(err) => {
                    log.error(
                        format!("could not read '{}'", path.display()),
                        Some(serde_json::json!({ "detail": err.to_string() })),
                    );
                }
            },
            BackendCommand::RemoveSlot { slot } => {
                let _ = grid.remove(slot).await;
            }
            BackendCommand::ResetWall => {
                let _ = grid.reset().await;
            }
            BackendCommand::SetDescription { text } => grid.set_description(text).await,
            BackendCommand::SaveDescription => {
                let _ = grid.save().await;
            }
            BackendCommand::SignIn { email, password } => {
                let outcome = session.sign_in(&email, &password).await;
                let _ = ui_tx.try_send(UiEvent::AuthCompleted(outcome));
            }
            BackendCommand::SignUp { email, password } => {
                let outcome = session.sign_up(&email, &password).await;
                let _ = ui_tx.try_send(UiEvent::AuthCompleted(outcome));
            }
            BackendCommand::SignOut => session.sign_out().await,
            BackendCommand::FetchSlotImage { slot, url } => {
                fetch_slot_image(&http, &ui_tx, slot, url);
            }
            BackendCommand::ClearLog => log.clear(),
        }
    }

    grid.shutdown().await;
    session.shutdown().await;
}

fn spawn_forwarders(
    grid: &Arc<GridController>,
    session: &Arc<SessionManager>,
    log: &LogBuffer,
    ui_tx: &Sender<UiEvent>,
) {
    {
        let grid = Arc::clone(grid);
        let ui_tx = ui_tx.clone();
        let mut events = grid.subscribe();
        tokio::spawn(async move {
            // every event carries the full state, so dropped events coalesce
            while let Ok(GridEvent::Changed) | Err(RecvError::Lagged(_)) = events.recv().await {
                let _ = ui_tx.try_send(UiEvent::WallUpdated(grid.snapshot().await));
            }
        });
    }
    {
        let session = Arc::clone(session);
        let ui_tx = ui_tx.clone();
        let mut events = session.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Changed(principal)) => {
                        let _ = ui_tx.try_send(UiEvent::SessionChanged(principal));
                    }
                    Err(RecvError::Lagged(_)) => {
                        let _ = ui_tx.try_send(UiEvent::SessionChanged(session.principal().await));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
    {
        let ui_tx = ui_tx.clone();
        let mut events = log.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let forwarded = match event {
                    LogEvent::Appended(entry) => UiEvent::LogAppended(entry),
                    LogEvent::Cleared => UiEvent::LogCleared,
                };
                let _ = ui_tx.try_send(forwarded);
            }
        });
    }
}

fn fetch_slot_image(
    http: &reqwest::Client,
    ui_tx: &Sender<UiEvent>,
    slot: SlotIndex,
    url: String,
) {
    let http = http.clone();
    let ui_tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = async {
            let bytes = http
                .get(&url)
                .send()
                .await
                .map_err(|err| format!("download failed: {err}"))?
                .error_for_status()
                .map_err(|err| format!("download rejected: {err}"))?
                .bytes()
                .await
                .map_err(|err| format!("download failed mid-body: {err}"))?;
            decode_preview(&bytes)
        }
        .await;
        let event = match result {
            Ok(image) => UiEvent::SlotImageLoaded { slot, url, image },
            Err(reason) => UiEvent::SlotImageFailed { slot, reason },
        };
        let _ = ui_tx.try_send(event);
    });
}
