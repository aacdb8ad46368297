//! Command orchestration helpers from UI actions to backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) {
    let cmd_name = match &cmd {
        BackendCommand::LoadWall => "load_wall",
        BackendCommand::UploadSlot { .. } => "upload_slot",
        BackendCommand::RemoveSlot { .. } => "remove_slot",
        BackendCommand::ResetWall => "reset_wall",
        BackendCommand::SetDescription { .. } => "set_description",
        BackendCommand::SaveDescription => "save_description",
        BackendCommand::SignIn { .. } => "sign_in",
        BackendCommand::SignUp { .. } => "sign_up",
        BackendCommand::SignOut => "sign_out",
        BackendCommand::FetchSlotImage { .. } => "fetch_slot_image",
        BackendCommand::ClearLog => "clear_log",
    };

    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued ui->backend command"),
        Err(TrySendError::Full(_)) => {
            *status = "Backend is busy; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status = "Backend worker stopped; restart the app".to_string();
        }
    }
}
