#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod canvas;
mod config;
mod emotion;
mod gesture;
mod model_download;
mod pipeline;
mod session;
mod types;
mod ui;

use anyhow::{Context, Result};
use gpui::Application;

use config::AppConfig;
use session::DrawingSession;

/// Starting canvas size; the window resizes it on the first frame.
const INITIAL_CANVAS: (u32, u32) = (960, 720);

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::from_env()?;
    let session = DrawingSession::from_config(&config, INITIAL_CANVAS.0, INITIAL_CANVAS.1)
        .context("invalid drawing setup")?;
    log::info!(
        "pinch threshold {}, depth {:?}, mirror {}",
        config.gesture.pinch_threshold,
        config.gesture.depth,
        config.gesture.mirror
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config, session) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
