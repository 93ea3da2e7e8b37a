use std::time::Duration;

use client_core::{
    ControllerEvent, ControllerState, Selection, UploadController, ACCEPTED_EXTENSIONS,
};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use egui::TextureHandle;
use image::GenericImageView;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::{describe_outcome, UiError, UiErrorContext, UiEvent},
    orchestration::dispatch_backend_command,
};

pub const WINDOW_TITLE: &str = "Image Forgery Detection";
const MAX_IMAGE_DIMENSION: f32 = 480.0;

struct LoadedImage {
    texture: TextureHandle,
    size: egui::Vec2,
}

pub struct DetectionApp {
    controller: UploadController,
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    preview: Option<LoadedImage>,
    heatmap: Option<LoadedImage>,
    requested_heatmap: Option<String>,
    status: String,
    error: Option<UiError>,
}

impl DetectionApp {
    pub fn new(
        controller: UploadController,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
    ) -> Self {
        Self {
            controller,
            cmd_tx,
            ui_rx,
            preview: None,
            heatmap: None,
            requested_heatmap: None,
            status: String::new(),
            error: None,
        }
    }

    fn process_ui_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Controller(event) => self.on_controller_event(event),
                UiEvent::SubmissionFinished(outcome) => {
                    self.status = describe_outcome(&outcome);
                }
                UiEvent::HeatmapLoaded { url, bytes } => {
                    // The reference may have moved on while the download ran.
                    if self.requested_heatmap.as_deref() != Some(url.as_str()) {
                        tracing::debug!(%url, "dropping stale heatmap image");
                        continue;
                    }
                    match decode_texture(ctx, &format!("heatmap:{url}"), &bytes) {
                        Ok(image) => self.heatmap = Some(image),
                        Err(err) => {
                            self.show_error(UiError::from_message(
                                UiErrorContext::HeatmapDownload,
                                format!("cannot decode heatmap image: {err}"),
                            ));
                        }
                    }
                }
                UiEvent::HeatmapFailed { url, reason } => {
                    if self.requested_heatmap.as_deref() == Some(url.as_str()) {
                        self.show_error(UiError::from_message(
                            UiErrorContext::HeatmapDownload,
                            reason,
                        ));
                    }
                }
                UiEvent::Error(err) => self.show_error(err),
            }
        }
    }

    fn on_controller_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::SelectionChanged { file_name } => {
                self.status = format!("Selected {file_name}");
            }
            ControllerEvent::SubmissionStarted { .. } => {
                self.status = "Predicting...".to_string();
                self.error = None;
            }
            ControllerEvent::SubmissionCancelled { generation } => {
                self.status = format!("Cancelled submission #{generation}");
            }
            ControllerEvent::PredictionReady { .. } => {
                self.status = "Generating heatmap...".to_string();
            }
            ControllerEvent::HeatmapReady { .. } => {
                self.status = "Loading heatmap...".to_string();
            }
            ControllerEvent::SubmissionFailed(failure) => {
                self.show_error(UiError::from_failure(&failure));
            }
        }
    }

    fn show_error(&mut self, error: UiError) {
        tracing::warn!(
            context = ?error.context(),
            category = ?error.category(),
            "{}",
            error.message()
        );
        self.error = Some(error);
    }

    fn choose_file(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", ACCEPTED_EXTENSIONS)
            .pick_file()
        else {
            return;
        };

        let selection = match Selection::from_path(&path) {
            Ok(selection) => selection,
            Err(err) => {
                self.show_error(UiError::from_message(
                    UiErrorContext::FileSelection,
                    format!("cannot read {}: {err}", path.display()),
                ));
                return;
            }
        };

        self.error = None;
        self.heatmap = None;
        self.requested_heatmap = None;
        self.preview = match decode_texture(
            ctx,
            &format!("preview:{}", path.display()),
            selection.bytes(),
        ) {
            Ok(image) => Some(image),
            Err(err) => {
                self.show_error(UiError::from_message(
                    UiErrorContext::FileSelection,
                    format!("cannot decode {}: {err}", path.display()),
                ));
                None
            }
        };
        self.controller.select_file(selection);
    }

    /// Keeps the downloaded heatmap in step with the controller's reference.
    fn sync_heatmap(&mut self, state: &ControllerState) {
        match &state.heatmap {
            None => {
                self.heatmap = None;
                self.requested_heatmap = None;
            }
            Some(reference) if self.requested_heatmap.as_deref() != Some(reference.url.as_str()) => {
                self.heatmap = None;
                self.requested_heatmap = Some(reference.url.clone());
                dispatch_backend_command(
                    &self.cmd_tx,
                    BackendCommand::FetchHeatmap {
                        url: reference.url.clone(),
                    },
                    &mut self.status,
                );
            }
            Some(_) => {}
        }
    }
}

impl eframe::App for DetectionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events(ctx);
        let state = self.controller.snapshot();
        self.sync_heatmap(&state);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(WINDOW_TITLE);
            ui.add_space(8.0);

            ui.horizontal(|ui| {
                if ui.button("Upload Image").clicked() {
                    self.choose_file(ctx);
                }
                if state.selection.is_some() {
                    let label = if state.is_predicting {
                        "Loading..."
                    } else {
                        "Predict"
                    };
                    if ui
                        .add_enabled(!state.is_predicting, egui::Button::new(label))
                        .clicked()
                    {
                        dispatch_backend_command(
                            &self.cmd_tx,
                            BackendCommand::Submit,
                            &mut self.status,
                        );
                    }
                }
            });

            if let Some(selection) = &state.selection {
                ui.label(format!(
                    "{} ({} bytes)",
                    selection.file_name(),
                    selection.len()
                ));
            }
            ui.separator();

            if let Some(prediction) = &state.prediction {
                ui.label(format!("Prediction: {}", prediction.label));
                ui.label(format!("Confidence: {}%", prediction.display_confidence()));
            }
            if let Some(error) = &self.error {
                ui.colored_label(ui.visuals().error_fg_color, error.user_message());
            }

            ui.horizontal_top(|ui| {
                for image in [&self.preview, &self.heatmap].into_iter().flatten() {
                    ui.image(egui::load::SizedTexture::new(image.texture.id(), image.size));
                }
            });

            if !self.status.is_empty() {
                ui.add_space(8.0);
                ui.small(self.status.as_str());
            }
        });

        let awaiting_heatmap = self.requested_heatmap.is_some() && self.heatmap.is_none();
        if state.is_predicting || awaiting_heatmap {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

impl Drop for DetectionApp {
    fn drop(&mut self) {
        if let Some(generation) = self.controller.cancel() {
            tracing::info!(%generation, "window closed; cancelled in-flight submission");
        }
    }
}

fn decode_texture(
    ctx: &egui::Context,
    name: &str,
    bytes: &[u8],
) -> Result<LoadedImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let (orig_w, orig_h) = decoded.dimensions();
    let scale = (MAX_IMAGE_DIMENSION / (orig_w.max(orig_h).max(1) as f32)).min(1.0);
    let resized = if scale < 1.0 {
        decoded.resize(
            (orig_w as f32 * scale).max(1.0) as u32,
            (orig_h as f32 * scale).max(1.0) as u32,
            image::imageops::FilterType::Triangle,
        )
    } else {
        decoded
    };
    let rgba = resized.to_rgba8();
    let [w, h] = [rgba.width() as usize, rgba.height() as usize];
    let color_image = egui::ColorImage::from_rgba_unmultiplied([w, h], rgba.as_raw());
    let texture = ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR);
    Ok(LoadedImage {
        texture,
        size: egui::vec2(w as f32, h as f32),
    })
}
