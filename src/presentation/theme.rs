use crate::domain::battery::BatteryLevel;
use eframe::egui;

pub struct Palette {
    pub bg: egui::Color32,
    pub fg: egui::Color32,
    pub stroke: egui::Color32,
    pub accent_yellow: egui::Color32,
    pub accent_green: egui::Color32,
    pub accent_red: egui::Color32,
    pub accent_blue: egui::Color32,
    pub muted: egui::Color32,
}

impl Palette {
    pub fn new(is_dark: bool) -> Self {
        if is_dark {
            Self {
                bg: egui::Color32::from_rgb(25, 25, 25),
                fg: egui::Color32::WHITE,
                stroke: egui::Color32::WHITE,
                accent_yellow: egui::Color32::from_rgb(255, 200, 0),
                accent_green: egui::Color32::from_rgb(0, 230, 118),
                accent_red: egui::Color32::from_rgb(255, 80, 80),
                accent_blue: egui::Color32::from_rgb(90, 140, 255),
                muted: egui::Color32::from_gray(150),
            }
        } else {
            Self {
                bg: egui::Color32::from_rgb(245, 245, 245),
                fg: egui::Color32::BLACK,
                stroke: egui::Color32::BLACK,
                accent_yellow: egui::Color32::from_rgb(255, 204, 0),
                accent_green: egui::Color32::from_rgb(0, 190, 90),
                accent_red: egui::Color32::from_rgb(230, 40, 40),
                accent_blue: egui::Color32::from_rgb(40, 90, 230),
                muted: egui::Color32::from_gray(110),
            }
        }
    }

    /// Colour of the battery readout for a charge bucket
    pub fn battery(&self, level: BatteryLevel) -> egui::Color32 {
        match level {
            BatteryLevel::Empty => self.accent_red,
            BatteryLevel::Quarter => egui::Color32::from_rgb(255, 140, 0),
            BatteryLevel::Half => self.accent_yellow,
            BatteryLevel::ThreeQuarters | BatteryLevel::Full => self.accent_green,
        }
    }
}

pub fn configure_theme(ctx: &egui::Context, is_dark: bool) {
    let mut style = (*ctx.style()).clone();
    let palette = Palette::new(is_dark);

    style
        .text_styles
        .iter_mut()
        .for_each(|(text_style, font_id)| {
            font_id.size = match text_style {
                egui::TextStyle::Heading => 26.0,
                egui::TextStyle::Body => 15.0,
                egui::TextStyle::Button => 16.0,
                _ => font_id.size,
            };
        });

    style.spacing.item_spacing = egui::vec2(10.0, 10.0);
    style.spacing.button_padding = egui::vec2(16.0, 10.0);

    let visuals = &mut style.visuals;
    for widget in [
        &mut visuals.widgets.noninteractive,
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
    ] {
        widget.rounding = egui::Rounding::same(10.0);
        widget.bg_stroke = egui::Stroke::new(1.5, palette.stroke);
        widget.fg_stroke = egui::Stroke::new(1.0, palette.fg);
    }

    visuals.widgets.noninteractive.bg_fill = palette.bg;
    visuals.widgets.inactive.bg_fill = if is_dark {
        egui::Color32::from_gray(35)
    } else {
        egui::Color32::WHITE
    };
    visuals.widgets.hovered.bg_fill = palette.accent_blue;
    visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
    visuals.widgets.active.bg_fill = palette.accent_green;
    visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);

    visuals.selection.stroke = egui::Stroke::new(1.0, palette.stroke);
    visuals.selection.bg_fill = palette.accent_blue;

    visuals.window_rounding = egui::Rounding::same(10.0);
    visuals.window_fill = palette.bg;
    visuals.panel_fill = palette.bg;
    visuals.override_text_color = Some(palette.fg);

    ctx.set_style(style);
}
