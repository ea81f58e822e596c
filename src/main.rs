//! Main application for the YouTube & Spotify downloader GUI

// Settings persisted between runs
mod config;
// Dispatcher, fetcher trait and the background worker
mod downloader;
// Job error taxonomy
mod error;
// tracing subscriber setup
mod logging;
// Data models for jobs, progress and worker events
mod model;
// Child process plumbing shared by both adapters
mod process;
// Progress parsing utilities
mod progress;
// Streaming-service (spotdl) adapter
mod spotdl;
// UI-thread state machine
mod state;
// Media fetcher (yt-dlp) adapter
mod ytdlp;

use std::sync::Arc;

use anyhow::{Context, anyhow};
// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// File and message dialogs
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{error, info};

use config::Settings;
use downloader::{ToolDispatcher, spawn_job};
use model::{Format, WorkerEvent};
use state::{AppState, Dialog, DialogLevel};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let rt = Arc::new(Runtime::new().context("failed to start the tokio runtime")?);
    RUNTIME
        .set(rt)
        .map_err(|_| anyhow!("runtime initialised twice"))?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([700.0, 550.0])
            .with_resizable(false)
            .with_title("Ultimate Media Downloader"),
        ..Default::default()
    };

    info!("starting downloader window");
    eframe::run_native(
        "Ultimate Media Downloader",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            let settings: Settings = cc
                .storage
                .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
                .unwrap_or_default();
            Box::new(DownloaderApp::new(settings))
        }),
    )
    .map_err(|e| anyhow!("window failed: {e}"))
}

/// The single download window
struct DownloaderApp {
    settings: Settings,
    state: AppState,
    dispatcher: Arc<ToolDispatcher>,
    events_tx: UnboundedSender<WorkerEvent>,
    events_rx: UnboundedReceiver<WorkerEvent>,
}

impl DownloaderApp {
    fn new(settings: Settings) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            state: AppState::new(&settings),
            dispatcher: Arc::new(ToolDispatcher::from_settings(&settings)),
            settings,
            events_tx,
            events_rx,
        }
    }

    fn start_download(&mut self) {
        let Ok(job) = self.state.begin() else {
            return;
        };
        let Some(rt) = RUNTIME.get() else {
            error!("runtime missing, cannot start job");
            self.state.apply(WorkerEvent::Finished(Err(error::JobError::Unexpected(
                "background runtime is not running".into(),
            ))));
            return;
        };

        info!(url = %job.url, format = ?job.format, "starting job");
        spawn_job(
            rt.handle(),
            Arc::clone(&self.dispatcher),
            job,
            self.events_tx.clone(),
        );
    }

    fn browse_folder(&mut self) {
        if let Some(folder) = FileDialog::new()
            .set_directory(&self.state.destination)
            .pick_folder()
        {
            self.state.destination = folder;
            self.settings.download_dir = self.state.destination.clone();
        }
    }

    fn folder_label(&self) -> String {
        let name = self
            .state
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.state.destination.display().to_string());
        format!("Save to: {name}")
    }
}

fn show_dialog(dialog: Dialog) {
    let level = match dialog.level {
        DialogLevel::Info => MessageLevel::Info,
        DialogLevel::Error => MessageLevel::Error,
    };
    MessageDialog::new()
        .set_level(level)
        .set_title(&dialog.title)
        .set_description(&dialog.message)
        .set_buttons(MessageButtons::Ok)
        .show();
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Drain worker events
        while let Ok(event) = self.events_rx.try_recv() {
            self.state.apply(event);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("YouTube & Spotify Downloader");
            });
            ui.add_space(10.0);

            // URL input
            ui.add(
                egui::TextEdit::singleline(&mut self.state.url)
                    .hint_text("Paste YouTube or Spotify URL here...")
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(10.0);

            // Format and folder
            ui.horizontal(|ui| {
                ui.label("Format:");
                for format in [Format::Video, Format::Audio] {
                    if ui
                        .radio_value(&mut self.state.format, format, format.label())
                        .changed()
                    {
                        self.settings.format = format;
                    }
                }
                ui.add_space(20.0);
                if ui.button("Select Folder").clicked() {
                    self.browse_folder();
                }
            });
            ui.label(egui::RichText::new(self.folder_label()).color(egui::Color32::GRAY));
            ui.add_space(10.0);

            // Progress
            ui.add(egui::ProgressBar::new(self.state.progress).show_percentage());
            ui.label(&self.state.status);
            ui.add_space(10.0);

            // Start button, disabled while a job runs
            let start = egui::Button::new(egui::RichText::new("START DOWNLOAD").strong().size(16.0))
                .min_size(egui::vec2(ui.available_width(), 50.0));
            if ui.add_enabled(self.state.can_start(), start).clicked() {
                self.start_download();
            }
            ui.add_space(10.0);

            // Log panel
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    for line in &self.state.log {
                        ui.label(
                            egui::RichText::new(format!("> {line}"))
                                .font(egui::FontId::monospace(12.0)),
                        );
                    }
                });
        });

        if let Some(dialog) = self.state.pending_dialog.take() {
            show_dialog(dialog);
        }

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.settings);
    }
}
