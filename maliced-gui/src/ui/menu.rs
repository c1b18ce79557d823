//! Top menu bar.

use eframe::egui::{self, RichText};

use crate::app::{MalicedApp, SetupState};
use crate::ui::colors;

/// Render the top menu bar.
pub fn render(app: &mut MalicedApp, ui: &mut egui::Ui, ctx: &egui::Context) {
    egui::menu::bar(ui, |ui| {
        // App title/logo
        ui.label(RichText::new("Maliced").strong().size(15.0));
        ui.separator();

        // File menu
        ui.menu_button("File", |ui| {
            if ui.button("Open Image...").clicked() {
                app.open_image_dialog();
                ui.close_menu();
            }

            if ui.button("Output Folder...").clicked() {
                app.open_output_dir_dialog();
                ui.close_menu();
            }

            if ui.button("Show Output Folder").clicked() {
                app.open_output_folder();
                ui.close_menu();
            }

            ui.separator();

            if ui.button("Reset Options").clicked() {
                app.reset_settings();
                ui.close_menu();
            }

            ui.separator();

            if ui.button("Quit").clicked() {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        });

        // Python Setup menu
        ui.menu_button("Python Setup", |ui| {
            let idle = !app.setup_in_progress();

            if ui
                .add_enabled(idle, egui::Button::new("Check Python Setup"))
                .clicked()
            {
                app.start_setup(false);
                ui.close_menu();
            }

            if ui
                .add_enabled(idle, egui::Button::new("Reinstall Python"))
                .clicked()
            {
                app.start_setup(true);
                ui.close_menu();
            }

            ui.separator();

            if ui.button("Show Setup Window").clicked() {
                app.show_setup_dialog = true;
                ui.close_menu();
            }
        });

        // Right-aligned status
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if let SetupState::Running { progress, .. } = &app.setup_state {
                ui.label(
                    RichText::new(format!("Setting up Python... {}%", progress))
                        .color(colors::ACCENT)
                        .size(12.0),
                );
                ui.spinner();
            } else if app.is_processing() {
                let time = ui.input(|i| i.time);
                let spinner = match ((time * 4.0) as i32) % 4 {
                    0 => ".",
                    1 => "..",
                    2 => "...",
                    _ => "",
                };
                ui.label(
                    RichText::new(format!("{} Processing", spinner))
                        .color(colors::ACCENT)
                        .size(12.0),
                );
            }
        });
    });
}
