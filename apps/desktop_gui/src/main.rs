use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use client_core::{load_settings, load_settings_from, Settings};
use crossbeam_channel::bounded;
use eframe::egui;

use backend_bridge::commands::BackendCommand;
use controller::events::UiEvent;
use ui::PhotoWallApp;

/// Shared 3x3 photo wall over a hosted identity/storage backend.
#[derive(Debug, Parser)]
#[command(name = "photowall", version)]
struct CliArgs {
    /// Backend endpoint URL; overrides the config file and environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Public API key; overrides the config file and environment.
    #[arg(long)]
    api_key: Option<String>,
    /// Alternate config file location.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Precedence: CLI flags, then environment, then config file.
fn resolve_settings(args: &CliArgs) -> anyhow::Result<Settings> {
    if let (Some(api_url), Some(api_key)) = (&args.api_url, &args.api_key) {
        return Settings::new(api_url, api_key);
    }
    let base = match &args.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    match base {
        Ok(base) => Settings::new(
            args.api_url.clone().unwrap_or(base.api_url),
            args.api_key.clone().unwrap_or(base.api_key),
        ),
        // a partial flag set cannot rescue a broken base config
        Err(err) => Err(err),
    }
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = CliArgs::parse();
    let settings = resolve_settings(&args);

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    backend_bridge::runtime::launch(settings, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Photo Wall")
            .with_inner_size([1100.0, 780.0])
            .with_min_inner_size([900.0, 640.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Photo Wall",
        options,
        Box::new(|_cc| Ok(Box::new(PhotoWallApp::new(cmd_tx, ui_rx)))),
    )
}
