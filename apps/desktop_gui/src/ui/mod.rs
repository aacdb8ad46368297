//! UI layer: the egui app shell and panels.

pub mod app;

pub use app::PhotoWallApp;
