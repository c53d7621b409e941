use crate::domain::models::{ControllerCommand, ControllerState};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::service;
use crate::infrastructure::bluetooth::ControllerHandle;
use crate::infrastructure::logging::{self, LoggingGuard};
use crate::presentation::theme;
use eframe::egui;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Home,
    Settings,
}

pub struct LedControlApp {
    pub(crate) settings: SettingsService,
    pub(crate) controller: Option<ControllerHandle>,
    pub(crate) state: ControllerState,

    // UI State
    pub(crate) selected_tab: Tab,
    pub(crate) is_dark_mode: bool,
    pub(crate) startup_error: Option<String>,
    pub(crate) settings_feedback: Option<String>,

    // Logging guard
    pub(crate) _logging_guard: Option<LoggingGuard>,
}

impl LedControlApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        theme::configure_theme(&cc.egui_ctx, false);

        let settings = SettingsService::new().unwrap_or_else(|e| {
            eprintln!("Settings directory unavailable ({}), using ./settings.json", e);
            SettingsService::load(PathBuf::from("settings.json"))
        });

        let logging_guard = logging::init_logger(&settings.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
            .ok();

        info!("Starting LED Control Application");
        info!("Settings file: {}", settings.path().display());

        let (controller, startup_error) = match service::spawn(settings.get()) {
            Ok(handle) => (Some(handle), None),
            Err(e) => {
                error!("Controller failed to start: {:#}", e);
                (None, Some(format!("Controller failed to start: {:#}", e)))
            }
        };

        Self {
            settings,
            controller,
            state: ControllerState::default(),
            selected_tab: Tab::Home,
            is_dark_mode: false,
            startup_error,
            settings_feedback: None,
            _logging_guard: logging_guard,
        }
    }

    /// Forward a user intent to the controller thread
    pub(crate) fn send(&self, command: ControllerCommand) {
        match &self.controller {
            Some(controller) => {
                if !controller.send(command) {
                    error!("Controller thread is gone, command dropped");
                }
            }
            None => warn!("No controller running, ignoring {:?}", command),
        }
    }

    fn sync_state(&mut self) {
        let Some(controller) = &self.controller else {
            return;
        };
        self.state = controller.state();

        if let Some(device) = &self.state.connected_device {
            if let Err(e) = self.settings.remember_device(device.id.0) {
                warn!("Could not remember device {}: {}", device.id, e);
            }
        }
    }
}

impl eframe::App for LedControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.sync_state();
        ctx.request_repaint_after(Duration::from_millis(100));

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.selectable_value(&mut self.selected_tab, Tab::Home, "Home");
                ui.selectable_value(&mut self.selected_tab, Tab::Settings, "Settings");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.is_dark_mode = !self.is_dark_mode;
                        theme::configure_theme(ctx, self.is_dark_mode);
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(480.0);
                    ui.add_space(20.0);

                    use crate::presentation::tabs;
                    match self.selected_tab {
                        Tab::Home => tabs::home::render(self, ui),
                        Tab::Settings => tabs::settings::render(self, ui),
                    }

                    ui.add_space(30.0);
                });
            });
        });
    }
}
