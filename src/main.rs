#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod analysis;
mod board;
mod config;
mod gesture;
mod model_download;
mod pipeline;
mod types;
mod ui;

use anyhow::Result;
use config::AppConfig;
use crossbeam_channel::bounded;
use gpui::Application;
use pipeline::RecognizerBackend;

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::load();
    if !config.has_api_key() {
        log::warn!(
            "no Gemini API key configured; set GEMINI_API_KEY or edit {}",
            AppConfig::path().display()
        );
    }

    // Latest-wins hand-offs: camera -> recognizer -> UI.
    let (frame_tx, frame_rx) = bounded(1);
    let (result_tx, result_rx) = bounded(1);
    let recognizer_backend = RecognizerBackend::default();

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(
                app,
                config,
                frame_tx,
                frame_rx,
                result_tx,
                result_rx,
                recognizer_backend,
            ) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
