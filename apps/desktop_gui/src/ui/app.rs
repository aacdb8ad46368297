//! The egui application: wall grid, account panel, and debug log.

use std::collections::{HashMap, HashSet};

use client_core::{GridPhase, GridSnapshot};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::domain::{LogEntry, LogLevel, Principal, SlotIndex};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::controller::orchestration::dispatch_backend_command;

const CELL_SIZE: f32 = 180.0;
const ZOOM_SIZE: f32 = 560.0;

const IMAGE_FILTER: (&str, &[&str]) = (
    "Images",
    &["png", "jpg", "jpeg", "gif", "webp", "bmp"],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Wall,
    Account,
    DebugLog,
}

pub struct PhotoWallApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    tab: Tab,
    startup_error: Option<String>,
    backend_ready: bool,
    status: String,

    wall: GridSnapshot,
    description_input: String,
    description_dirty: bool,
    zoomed: Option<SlotIndex>,
    confirm_reset: bool,

    principal: Option<Principal>,
    auth_in_flight: bool,
    auth_error: Option<String>,
    email_input: String,
    password_input: String,

    log_entries: Vec<LogEntry>,

    textures: HashMap<String, egui::TextureHandle>,
    fetching: HashSet<String>,
    failed_urls: HashSet<String>,
}

impl PhotoWallApp {
    pub fn new(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            tab: Tab::Wall,
            startup_error: None,
            backend_ready: false,
            status: String::new(),
            wall: GridSnapshot {
                phase: GridPhase::Loading,
                slots: Default::default(),
                description: String::new(),
                last_error: None,
            },
            description_input: String::new(),
            description_dirty: false,
            zoomed: None,
            confirm_reset: false,
            principal: None,
            auth_in_flight: false,
            auth_error: None,
            email_input: String::new(),
            password_input: String::new(),
            log_entries: Vec::new(),
            textures: HashMap::new(),
            fetching: HashSet::new(),
            failed_urls: HashSet::new(),
        }
    }

    fn dispatch(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status);
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        let events: Vec<UiEvent> = self.ui_rx.try_iter().collect();
        for event in events {
            match event {
                UiEvent::BackendReady => self.backend_ready = true,
                UiEvent::StartupFailed(message) => self.startup_error = Some(message),
                UiEvent::WallUpdated(snapshot) => {
                    if !self.description_dirty {
                        self.description_input = snapshot.description.clone();
                    }
                    self.prune_image_cache(&snapshot);
                    self.wall = snapshot;
                }
                UiEvent::SessionChanged(principal) => self.principal = principal,
                UiEvent::AuthCompleted(outcome) => {
                    self.auth_in_flight = false;
                    if outcome.success {
                        self.auth_error = None;
                        self.email_input.clear();
                        self.password_input.clear();
                    } else {
                        self.auth_error = outcome.error;
                    }
                }
                UiEvent::LogAppended(entry) => self.log_entries.push(entry),
                UiEvent::LogCleared => self.log_entries.clear(),
                UiEvent::SlotImageLoaded { url, image, .. } => {
                    self.fetching.remove(&url);
                    self.failed_urls.remove(&url);
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(
                        image.size,
                        &image.rgba,
                    );
                    let handle =
                        ctx.load_texture(url.clone(), color_image, egui::TextureOptions::LINEAR);
                    self.textures.insert(url, handle);
                }
                UiEvent::SlotImageFailed { slot, reason } => {
                    if let Some(url) = &self.wall.slots[slot.as_usize()] {
                        self.fetching.remove(url);
                        self.failed_urls.insert(url.clone());
                    }
                    tracing::warn!(slot = slot.get(), "image fetch failed: {reason}");
                }
                UiEvent::Info(message) => self.status = message,
            }
        }
    }

    /// Drop cached textures for URLs no longer shown anywhere on the wall.
    fn prune_image_cache(&mut self, snapshot: &GridSnapshot) {
        let live: HashSet<&String> = snapshot.slots.iter().flatten().collect();
        self.textures.retain(|url, _| live.contains(url));
        self.fetching.retain(|url| live.contains(url));
        self.failed_urls.retain(|url| live.contains(url));
    }

    fn request_image(&mut self, slot: SlotIndex, url: &str) {
        if self.textures.contains_key(url)
            || self.fetching.contains(url)
            || self.failed_urls.contains(url)
        {
            return;
        }
        self.fetching.insert(url.to_string());
        self.dispatch(BackendCommand::FetchSlotImage {
            slot,
            url: url.to_string(),
        });
    }

    fn pick_image_for(&mut self, slot: SlotIndex) {
        let picked = rfd::FileDialog::new()
            .add_filter(IMAGE_FILTER.0, IMAGE_FILTER.1)
            .pick_file();
        if let Some(path) = picked {
            self.dispatch(BackendCommand::UploadSlot { slot, path });
        }
    }

    fn signed_in(&self) -> bool {
        self.principal.is_some()
    }

    fn wall_tab(&mut self, ui: &mut egui::Ui) {
        self.description_row(ui);
        ui.separator();

        if let Some(error) = self.wall.last_error.clone() {
            ui.colored_label(egui::Color32::LIGHT_RED, error);
            ui.separator();
        }

        match self.wall.phase.clone() {
            GridPhase::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading the wall...");
                });
            }
            GridPhase::Error(message) => {
                ui.colored_label(egui::Color32::LIGHT_RED, message);
                if ui.button("Try again").clicked() {
                    self.dispatch(BackendCommand::LoadWall);
                }
            }
            GridPhase::Ready => self.wall_grid(ui),
        }
    }

    fn description_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.description_input)
                    .hint_text("Describe this wall...")
                    .desired_width(420.0),
            );
            if response.changed() {
                self.description_dirty = true;
            }
            let can_save = self.signed_in() && self.description_dirty;
            if ui
                .add_enabled(can_save, egui::Button::new("Save"))
                .clicked()
            {
                self.dispatch(BackendCommand::SetDescription {
                    text: self.description_input.clone(),
                });
                self.dispatch(BackendCommand::SaveDescription);
                self.description_dirty = false;
            }
        });
    }

    fn wall_grid(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("photo_wall")
            .spacing([10.0, 10.0])
            .show(ui, |ui| {
                for slot in SlotIndex::all() {
                    self.wall_cell(ui, slot);
                    if slot.column() == 2 {
                        ui.end_row();
                    }
                }
            });

        ui.add_space(8.0);
        if self.signed_in() {
            if self.confirm_reset {
                ui.horizontal(|ui| {
                    ui.label("Remove every photo from the wall?");
                    if ui.button("Yes, clear it").clicked() {
                        self.dispatch(BackendCommand::ResetWall);
                        self.confirm_reset = false;
                    }
                    if ui.button("Keep them").clicked() {
                        self.confirm_reset = false;
                    }
                });
            } else if ui.button("Clear wall").clicked() {
                self.confirm_reset = true;
            }
        }

        self.zoom_overlay(ui.ctx());
    }

    fn wall_cell(&mut self, ui: &mut egui::Ui, slot: SlotIndex) {
        let url = self.wall.slots[slot.as_usize()].clone();
        ui.vertical(|ui| {
            ui.set_width(CELL_SIZE);
            match url {
                Some(url) => {
                    self.request_image(slot, &url);
                    if let Some(texture) = self.textures.get(&url).cloned() {
                        let response = ui.add(
                            egui::Image::new(&texture)
                                .fit_to_exact_size(egui::vec2(CELL_SIZE, CELL_SIZE))
                                .sense(egui::Sense::click()),
                        );
                        if response.clicked() {
                            self.zoomed = Some(slot);
                        }
                    } else if self.failed_urls.contains(&url) {
                        self.placeholder(ui, "Image unavailable");
                        if ui.small_button("Retry").clicked() {
                            self.failed_urls.remove(&url);
                        }
                    } else {
                        self.placeholder(ui, "");
                        ui.spinner();
                    }
                    if self.signed_in() {
                        ui.horizontal(|ui| {
                            if ui.small_button("Replace").clicked() {
                                self.pick_image_for(slot);
                            }
                            if ui.small_button("Remove").clicked() {
                                self.dispatch(BackendCommand::RemoveSlot { slot });
                            }
                        });
                    }
                }
                None => {
                    self.placeholder(ui, "Empty");
                    if self.signed_in() && ui.button("Add photo").clicked() {
                        self.pick_image_for(slot);
                    }
                }
            }
        });
    }

    fn placeholder(&self, ui: &mut egui::Ui, text: &str) {
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(CELL_SIZE, CELL_SIZE), egui::Sense::hover());
        ui.painter().rect_filled(
            rect,
            egui::CornerRadius::same(4),
            ui.visuals().extreme_bg_color,
        );
        if !text.is_empty() {
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                text,
                egui::FontId::proportional(14.0),
                ui.visuals().weak_text_color(),
            );
        }
    }

    fn zoom_overlay(&mut self, ctx: &egui::Context) {
        let Some(slot) = self.zoomed else {
            return;
        };
        let Some(url) = self.wall.slots[slot.as_usize()].clone() else {
            self.zoomed = None;
            return;
        };
        let mut open = true;
        egui::Window::new("Photo")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                if let Some(texture) = self.textures.get(&url) {
                    ui.add(
                        egui::Image::new(texture)
                            .fit_to_exact_size(egui::vec2(ZOOM_SIZE, ZOOM_SIZE)),
                    );
                } else {
                    ui.spinner();
                }
            });
        if !open {
            self.zoomed = None;
        }
    }

    fn account_tab(&mut self, ui: &mut egui::Ui) {
        match self.principal.clone() {
            Some(principal) => {
                ui.heading("Account");
                ui.label(format!("Signed in as {}", principal.email));
                ui.add_space(6.0);
                if ui.button("Sign out").clicked() {
                    self.dispatch(BackendCommand::SignOut);
                }
            }
            None => {
                ui.heading("Sign in");
                ui.add(
                    egui::TextEdit::singleline(&mut self.email_input)
                        .hint_text("email")
                        .desired_width(280.0),
                );
                ui.add(
                    egui::TextEdit::singleline(&mut self.password_input)
                        .hint_text("password")
                        .password(true)
                        .desired_width(280.0),
                );
                ui.add_space(6.0);
                if self.auth_in_flight {
                    ui.spinner();
                } else {
                    ui.horizontal(|ui| {
                        let ready =
                            !self.email_input.is_empty() && !self.password_input.is_empty();
                        if ui.add_enabled(ready, egui::Button::new("Sign in")).clicked() {
                            self.auth_in_flight = true;
                            self.dispatch(BackendCommand::SignIn {
                                email: self.email_input.trim().to_string(),
                                password: self.password_input.clone(),
                            });
                        }
                        if ui
                            .add_enabled(ready, egui::Button::new("Create account"))
                            .clicked()
                        {
                            self.auth_in_flight = true;
                            self.dispatch(BackendCommand::SignUp {
                                email: self.email_input.trim().to_string(),
                                password: self.password_input.clone(),
                            });
                        }
                    });
                }
                if let Some(error) = &self.auth_error {
                    ui.colored_label(egui::Color32::LIGHT_RED, error);
                }
            }
        }
    }

    fn debug_log_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Debug log");
            if ui.button("Clear").clicked() {
                self.dispatch(BackendCommand::ClearLog);
            }
        });
        ui.separator();
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in &self.log_entries {
                    log_row(ui, entry);
                }
            });
    }
}

fn log_row(ui: &mut egui::Ui, entry: &LogEntry) {
    let color = level_color(entry.level);
    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(
                entry
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%H:%M:%S")
                    .to_string(),
            )
            .monospace()
            .weak(),
        );
        ui.label(egui::RichText::new(entry.level.label()).color(color).monospace());
        ui.label(&entry.message);
    });
    if let Some(details) = &entry.details {
        ui.label(egui::RichText::new(details.to_string()).small().weak());
    }
}

fn level_color(level: LogLevel) -> egui::Color32 {
    match level {
        LogLevel::Info => egui::Color32::LIGHT_BLUE,
        LogLevel::Warning => egui::Color32::YELLOW,
        LogLevel::Error => egui::Color32::LIGHT_RED,
        LogLevel::Success => egui::Color32::LIGHT_GREEN,
    }
}

impl eframe::App for PhotoWallApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        if let Some(error) = self.startup_error.clone() {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.heading("Photo Wall could not start");
                ui.add_space(8.0);
                ui.colored_label(egui::Color32::LIGHT_RED, error);
            });
            return;
        }

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Wall, "Wall");
                ui.selectable_value(&mut self.tab, Tab::Account, "Account");
                ui.selectable_value(&mut self.tab, Tab::DebugLog, "Debug log");
                if !self.backend_ready {
                    ui.spinner();
                }
                if !self.status.is_empty() {
                    ui.separator();
                    ui.label(&self.status);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Wall => self.wall_tab(ui),
            Tab::Account => self.account_tab(ui),
            Tab::DebugLog => self.debug_log_tab(ui),
        });

        // backend events arrive off-thread; poll for them at a steady cadence
        ctx.request_repaint_after(std::time::Duration::from_millis(200));
    }
}
