//! Events flowing from the backend worker back to the egui thread.

use client_core::{AuthOutcome, GridSnapshot};
use shared::domain::{LogEntry, Principal, SlotIndex};

/// Raw RGBA pixels ready to become an egui texture.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub size: [usize; 2],
    pub rgba: Vec<u8>,
}

/// Decode downloaded image bytes into texture-ready pixels.
pub fn decode_preview(bytes: &[u8]) -> Result<PreviewImage, String> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| format!("stored image could not be decoded: {err}"))?;
    let rgba = decoded.to_rgba8();
    Ok(PreviewImage {
        size: [rgba.width() as usize, rgba.height() as usize],
        rgba: rgba.into_raw(),
    })
}

pub enum UiEvent {
    BackendReady,
    /// The worker could not start at all; the UI shows this and nothing else.
    StartupFailed(String),
    WallUpdated(GridSnapshot),
    SessionChanged(Option<Principal>),
    AuthCompleted(AuthOutcome),
    LogAppended(LogEntry),
    LogCleared,
    SlotImageLoaded {
        slot: SlotIndex,
        url: String,
        image: PreviewImage,
    },
    SlotImageFailed {
        slot: SlotIndex,
        reason: String,
    },
    Info(String),
}

/// Turn a raw startup error into guidance the user can act on.
pub fn friendly_startup_message(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("missing backend endpoint") || lower.contains("missing public api key") {
        format!(
            "Backend connection is not configured. Set PHOTOWALL_API_URL and PHOTOWALL_API_KEY \
             (or create photowall.toml) and relaunch. Detail: {message}"
        )
    } else if lower.contains("invalid backend endpoint") || lower.contains("http or https") {
        format!("The configured backend URL is not usable. Detail: {message}")
    } else {
        format!("Backend worker failed to start: {message}")
    }
}
