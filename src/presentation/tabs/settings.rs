use crate::domain::settings::Backend;
use crate::presentation::app::LedControlApp;
use crate::presentation::components::Components;
use eframe::egui;
use tracing::{error, info};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn render(app: &mut LedControlApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Settings");
    ui.add_space(20.0);

    let settings_mut = app.settings.get_mut();

    Components::card(ui, "Bluetooth", |ui| {
        ui.horizontal(|ui| {
            ui.label("Backend:");
            ui.radio_value(&mut settings_mut.backend, Backend::Live, "Live adapter");
            ui.radio_value(&mut settings_mut.backend, Backend::Simulated, "Simulated");
        });
        if let Some(controller) = &app.controller {
            ui.label(format!("Running: {:?}", controller.backend()));
        }

        ui.horizontal(|ui| {
            ui.label("Scan Window (s):");
            ui.add(egui::Slider::new(&mut settings_mut.scan_timeout_secs, 1..=60));
        });

        ui.collapsing("Override UUIDs", |ui| {
            ui.label(
                egui::RichText::new("⚠️ Warning: Altering these may break device discovery.")
                    .color(egui::Color32::from_rgb(255, 200, 0)),
            );

            egui::Grid::new("ble_uuids")
                .spacing([10.0, 10.0])
                .show(ui, |ui| {
                    ui.label("Service:");
                    ui.text_edit_singleline(&mut settings_mut.ble_service_uuid);
                    ui.end_row();

                    ui.label("LED:");
                    ui.text_edit_singleline(&mut settings_mut.ble_led_char_uuid);
                    ui.end_row();

                    ui.label("Battery:");
                    let battery = settings_mut
                        .ble_battery_char_uuid
                        .get_or_insert_with(String::new);
                    ui.text_edit_singleline(battery);
                    ui.end_row();
                });
        });
    });

    ui.add_space(10.0);

    Components::card(ui, "Logging", |ui| {
        let log = &mut settings_mut.log_settings;
        egui::ComboBox::from_label("Level")
            .selected_text(log.level.clone())
            .show_ui(ui, |ui| {
                for level in LOG_LEVELS {
                    ui.selectable_value(&mut log.level, level.to_string(), level);
                }
            });
        ui.checkbox(&mut log.console_logging_enabled, "Console output");
        ui.checkbox(&mut log.file_logging_enabled, "Write log files");
        ui.horizontal(|ui| {
            ui.label("Log directory:");
            ui.text_edit_singleline(&mut log.log_dir);
        });
    });

    ui.add_space(10.0);

    if ui.button("Save").clicked() {
        let settings = app.settings.get();
        app.settings_feedback = Some(match settings.controller_config() {
            Err(e) => format!("Not saved: {}", e),
            Ok(_) => match app.settings.save() {
                Ok(()) => {
                    info!("Settings saved to {}", app.settings.path().display());
                    "Saved. Restart to apply.".to_string()
                }
                Err(e) => {
                    error!("Failed to save settings: {}", e);
                    format!("Failed to save settings: {}", e)
                }
            },
        });
    }

    if let Some(feedback) = &app.settings_feedback {
        ui.label(feedback);
    }
}
