//! Backend commands queued from UI to backend worker.

use std::path::PathBuf;

use shared::domain::SlotIndex;

pub enum BackendCommand {
    LoadWall,
    UploadSlot {
        slot: SlotIndex,
        path: PathBuf,
    },
    RemoveSlot {
        slot: SlotIndex,
    },
    ResetWall,
    SetDescription {
        text: String,
    },
    SaveDescription,
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
    },
    SignOut,
    /// Download a stored image so the UI can turn it into a texture.
    FetchSlotImage {
        slot: SlotIndex,
        url: String,
    },
    ClearLog,
}
