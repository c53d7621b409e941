use crate::domain::battery::BatteryLevel;
use crate::domain::models::{ControllerCommand, DeviceHandle};
use crate::presentation::app::LedControlApp;
use crate::presentation::components::Components;
use crate::presentation::theme::Palette;
use eframe::egui;

pub fn render(app: &mut LedControlApp, ui: &mut egui::Ui) {
    let palette = Palette::new(app.is_dark_mode);

    Components::heading(ui, "LED Control");
    ui.add_space(10.0);

    if let Some(err) = &app.startup_error {
        ui.label(egui::RichText::new(err).color(palette.accent_red).strong());
        ui.add_space(10.0);
    }

    ui_status_row(app, ui, &palette);
    ui.add_space(15.0);

    if app.state.is_connected {
        ui_led_panel(app, ui, &palette);
    } else {
        ui_device_list(app, ui, &palette);
        ui.add_space(10.0);
        ui_scan_button(app, ui, &palette);
    }
}

fn ui_status_row(app: &LedControlApp, ui: &mut egui::Ui, palette: &Palette) {
    Components::card(ui, "", |ui| {
        ui.horizontal(|ui| {
            let color = if app.state.is_connected {
                palette.accent_green
            } else {
                palette.accent_red
            };
            Components::status_dot(ui, color);
            ui.label(egui::RichText::new(&app.state.status_message).color(palette.muted));
        });
    });
}

fn ui_device_list(app: &mut LedControlApp, ui: &mut egui::Ui, palette: &Palette) {
    let mut selected: Option<DeviceHandle> = None;

    Components::card(ui, "Available Devices", |ui| {
        if app.state.discovered_devices.is_empty() {
            ui.label(egui::RichText::new("No devices found").color(palette.muted));
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("scan_results")
            .max_height(240.0)
            .show(ui, |ui| {
                for device in &app.state.discovered_devices {
                    let text = format!("{}\n{}", device.display_name(), device.id);
                    let button = egui::Button::new(egui::RichText::new(text))
                        .min_size(egui::vec2(ui.available_width(), 48.0));
                    if ui.add(button).clicked() {
                        selected = Some(device.clone());
                    }
                }
            });
    });

    if let Some(device) = selected {
        app.send(ControllerCommand::Connect(device));
    }
}

fn ui_scan_button(app: &mut LedControlApp, ui: &mut egui::Ui, palette: &Palette) {
    if app.state.is_scanning {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label("Scanning...");
        });
        if Components::wide_button(ui, "⏹ Stop Scanning", palette.accent_red).clicked() {
            app.send(ControllerCommand::StopScan);
        }
    } else if Components::wide_button(ui, "📡 Scan for Devices", palette.accent_blue).clicked() {
        app.send(ControllerCommand::StartScan);
    }
}

fn ui_led_panel(app: &mut LedControlApp, ui: &mut egui::Ui, palette: &Palette) {
    let percentage = app.state.battery_percentage;
    let level = BatteryLevel::from_percentage(percentage);

    if let Some(device) = &app.state.connected_device {
        Components::sub_heading(ui, device.display_name());
        ui.add_space(10.0);
    }

    Components::card(ui, "Battery", |ui| {
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new(format!("🔋 {}V", app.state.battery_voltage))
                    .color(palette.battery(level))
                    .strong()
                    .size(18.0),
            );
            ui.label(format!("{}% ({})", percentage, level.label()));
        });
    });
    ui.add_space(15.0);

    let led_on = app.state.led_state;
    let (bulb_color, label) = if led_on {
        (palette.accent_yellow, "ON")
    } else {
        (palette.muted, "OFF")
    };
    ui.label(egui::RichText::new("💡").size(96.0).color(bulb_color));

    Components::card(ui, "LED Control", |ui| {
        let mut requested = led_on;
        if ui
            .checkbox(&mut requested, egui::RichText::new(label).strong())
            .changed()
        {
            app.send(ControllerCommand::SetLed(requested));
        }
    });
    ui.add_space(20.0);

    if Components::wide_button(ui, "✖ Disconnect", palette.accent_red).clicked() {
        app.send(ControllerCommand::Disconnect);
    }
}
