use eframe::egui;

pub struct Components;

impl Components {
    pub fn heading(ui: &mut egui::Ui, text: &str) {
        ui.heading(egui::RichText::new(text).strong());
    }

    pub fn sub_heading(ui: &mut egui::Ui, text: &str) {
        ui.label(egui::RichText::new(text).strong().size(16.0));
    }

    pub fn card<R>(
        ui: &mut egui::Ui,
        title: &str,
        add_contents: impl FnOnce(&mut egui::Ui) -> R,
    ) -> R {
        let stroke = ui.style().visuals.widgets.noninteractive.bg_stroke;
        let bg = ui.style().visuals.widgets.noninteractive.bg_fill;

        egui::Frame::none()
            .inner_margin(egui::Margin::same(15.0))
            .rounding(egui::Rounding::same(10.0))
            .stroke(stroke)
            .fill(bg)
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.vertical(|ui| {
                    if !title.is_empty() {
                        ui.label(egui::RichText::new(title).strong().size(18.0));
                        ui.add_space(8.0);
                    }
                    add_contents(ui)
                })
                .inner
            })
            .inner
    }

    /// Small filled circle, used as a connection indicator
    pub fn status_dot(ui: &mut egui::Ui, color: egui::Color32) {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
        ui.painter().circle_filled(rect.center(), 6.0, color);
    }

    /// Full-width button with a solid background
    pub fn wide_button(ui: &mut egui::Ui, text: &str, fill: egui::Color32) -> egui::Response {
        ui.add_sized(
            [ui.available_width(), 40.0],
            egui::Button::new(
                egui::RichText::new(text)
                    .color(egui::Color32::WHITE)
                    .strong(),
            )
            .fill(fill),
        )
    }
}
