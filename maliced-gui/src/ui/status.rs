//! Status bar at the bottom of the window.

use eframe::egui::{self, RichText};

use crate::app::MalicedApp;
use crate::ui::colors;

/// Render the status bar.
pub fn render(app: &MalicedApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());

    ui.horizontal(|ui| {
        // Status message
        if let Some((msg, _)) = &app.status_message {
            ui.label(RichText::new(msg).size(11.0).color(muted));
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            // Runtime state
            if app.python_ready() {
                ui.label(RichText::new("Python ready").size(11.0).color(colors::SUCCESS));
            } else {
                ui.label(
                    RichText::new("Python not installed")
                        .size(11.0)
                        .color(colors::ERROR),
                );
            }
            ui.separator();

            // Output folder
            let dir = app.output_dir();
            let path_str = dir.to_string_lossy();
            let display_path = if path_str.chars().count() > 50 {
                let tail: String = path_str
                    .chars()
                    .rev()
                    .take(47)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                format!("...{}", tail)
            } else {
                path_str.to_string()
            };
            ui.label(
                RichText::new(format!("📁 {}", display_path))
                    .size(11.0)
                    .color(muted),
            );
        });
    });
}
