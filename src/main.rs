use eframe::egui;
use led_control::presentation::LedControlApp;

fn main() -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 720.0])
            .with_title("LED Control"),
        ..Default::default()
    };

    eframe::run_native(
        "LED Control",
        options,
        Box::new(|cc| Ok(Box::new(LedControlApp::new(cc)))),
    )
}
