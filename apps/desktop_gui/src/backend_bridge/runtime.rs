//! Backend worker: owns the tokio runtime that drives submissions and heatmap
//! downloads, and forwards controller events to the UI thread.

use std::{thread, time::Duration};

use anyhow::Result;
use client_core::UploadController;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use eframe::egui;
use tokio::sync::broadcast::error::RecvError;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

/// How long a terminal event may wait for room in a full UI queue.
const TERMINAL_EVENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
    Disconnected,
}

/// Hands a progress event to the UI without waiting; drops it when the queue is full.
pub fn offer(ui_tx: &Sender<UiEvent>, event: UiEvent) -> Delivery {
    match ui_tx.try_send(event) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("ui event queue full; dropping progress event");
            Delivery::Dropped
        }
        Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
    }
}

/// Hands a terminal event (submission result, heatmap bytes) to the UI,
/// waiting for room when the queue is full. Blocks the calling thread.
pub fn deliver(ui_tx: &Sender<UiEvent>, event: UiEvent) -> Delivery {
    let event = match ui_tx.try_send(event) {
        Ok(()) => return Delivery::Sent,
        Err(TrySendError::Disconnected(_)) => return Delivery::Disconnected,
        Err(TrySendError::Full(event)) => event,
    };
    tracing::warn!("ui event queue full; waiting to deliver terminal event");
    match ui_tx.send_timeout(event, TERMINAL_EVENT_TIMEOUT) {
        Ok(()) => Delivery::Sent,
        Err(SendTimeoutError::Timeout(_)) => {
            tracing::error!(
                timeout_ms = TERMINAL_EVENT_TIMEOUT.as_millis() as u64,
                "ui did not drain its event queue; terminal event lost"
            );
            Delivery::Dropped
        }
        Err(SendTimeoutError::Disconnected(_)) => Delivery::Disconnected,
    }
}

fn deliver_from_task(ui_tx: &Sender<UiEvent>, egui_ctx: &egui::Context, event: UiEvent) {
    // A full queue only drains on the next frame.
    egui_ctx.request_repaint();
    if tokio::task::block_in_place(|| deliver(ui_tx, event)) == Delivery::Sent {
        egui_ctx.request_repaint();
    }
}

pub fn launch(
    controller: UploadController,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    egui_ctx: egui::Context,
) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                deliver(
                    &ui_tx,
                    UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: failed to build runtime: {err}"),
                    )),
                );
                egui_ctx.request_repaint();
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let http = reqwest::Client::new();
            let event_task = tokio::spawn(forward_controller_events(
                controller.clone(),
                ui_tx.clone(),
                egui_ctx.clone(),
            ));
            tracing::info!("backend worker ready");

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Submit => {
                        let controller = controller.clone();
                        let ui_tx = ui_tx.clone();
                        let egui_ctx = egui_ctx.clone();
                        tokio::spawn(async move {
                            let event = match controller.submit().await {
                                Ok(outcome) => UiEvent::SubmissionFinished(outcome),
                                Err(err) => UiEvent::Error(UiError::from_message(
                                    UiErrorContext::Submission,
                                    err.to_string(),
                                )),
                            };
                            deliver_from_task(&ui_tx, &egui_ctx, event);
                        });
                    }
                    BackendCommand::FetchHeatmap { url } => {
                        let http = http.clone();
                        let ui_tx = ui_tx.clone();
                        let egui_ctx = egui_ctx.clone();
                        tokio::spawn(async move {
                            let event = match fetch_heatmap(&http, &url).await {
                                Ok(bytes) => UiEvent::HeatmapLoaded { url, bytes },
                                Err(err) => UiEvent::HeatmapFailed {
                                    url,
                                    reason: format!("{err:#}"),
                                },
                            };
                            deliver_from_task(&ui_tx, &egui_ctx, event);
                        });
                    }
                }
            }

            tracing::info!("ui command channel closed; stopping backend worker");
            event_task.abort();
        });
    });
}

async fn forward_controller_events(
    controller: UploadController,
    ui_tx: Sender<UiEvent>,
    egui_ctx: egui::Context,
) {
    let mut events = controller.subscribe_events();
    loop {
        match events.recv().await {
            Ok(event) => {
                if offer(&ui_tx, UiEvent::Controller(event)) == Delivery::Disconnected {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "ui fell behind controller events");
            }
            Err(RecvError::Closed) => break,
        }
        egui_ctx.request_repaint();
    }
}

async fn fetch_heatmap(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let bytes = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn finished_heatmap(url: &str) -> UiEvent {
        UiEvent::HeatmapLoaded {
            url: url.to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn offer_drops_progress_events_when_queue_is_full() {
        let (tx, rx) = bounded(1);
        assert_eq!(offer(&tx, finished_heatmap("a")), Delivery::Sent);
        assert_eq!(offer(&tx, finished_heatmap("b")), Delivery::Dropped);
        assert!(matches!(rx.try_recv(), Ok(UiEvent::HeatmapLoaded { url, .. }) if url == "a"));
    }

    #[test]
    fn deliver_waits_for_room_in_a_full_queue() {
        let (tx, rx) = bounded(1);
        assert_eq!(deliver(&tx, finished_heatmap("first")), Delivery::Sent);

        let drain = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut urls = Vec::new();
            while let Ok(event) = rx.recv_timeout(Duration::from_secs(1)) {
                if let UiEvent::HeatmapLoaded { url, .. } = event {
                    urls.push(url);
                }
            }
            urls
        });

        assert_eq!(deliver(&tx, finished_heatmap("second")), Delivery::Sent);
        drop(tx);
        assert_eq!(drain.join().expect("drain thread"), vec!["first", "second"]);
    }

    #[test]
    fn deliver_reports_closed_ui() {
        let (tx, rx) = bounded(1);
        drop(rx);
        assert_eq!(deliver(&tx, finished_heatmap("x")), Delivery::Disconnected);
        assert_eq!(offer(&tx, finished_heatmap("x")), Delivery::Disconnected);
    }
}
