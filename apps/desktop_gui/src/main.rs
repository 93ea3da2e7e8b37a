use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{config, UploadController};
use crossbeam_channel::bounded;
use eframe::egui;
use shared::domain::ConfidenceScale;
use tracing_subscriber::EnvFilter;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::ui::{DetectionApp, WINDOW_TITLE};

#[derive(Parser, Debug)]
#[command(about = "Upload an image and ask the forgery detection service about it")]
struct Args {
    /// Settings file; missing files fall back to defaults and environment.
    #[arg(long, default_value = config::SETTINGS_FILE)]
    config: PathBuf,
    /// Overrides the prediction service base URL.
    #[arg(long)]
    service_url: Option<String>,
    /// How the service reports confidence: `fraction` or `percent`.
    #[arg(long)]
    confidence_scale: Option<ConfidenceScale>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = config::load_settings_from(&args.config);
    if let Some(service_url) = args.service_url {
        settings.service_base_url = service_url;
    }
    if let Some(confidence_scale) = args.confidence_scale {
        settings.confidence_scale = confidence_scale;
    }
    let controller = UploadController::from_settings(&settings)
        .context("invalid prediction service configuration")?;
    tracing::info!(
        service = %settings.service_base_url,
        confidence_scale = %settings.confidence_scale,
        "starting desktop gui"
    );

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([1040.0, 720.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| {
            backend_bridge::runtime::launch(
                controller.clone(),
                cmd_rx,
                ui_tx,
                cc.egui_ctx.clone(),
            );
            Ok(Box::new(DetectionApp::new(controller, cmd_tx, ui_rx)))
        }),
    )
    .map_err(|err| anyhow!("desktop gui exited with error: {err}"))
}
