//! Processing options side panel.
//!
//! Every change is written to the settings file immediately.

use eframe::egui::{self, RichText};

use maliced_core::config::{
    FAKE_METADATA_TYPES, LOGO_POSITIONS, MAX_NOISE_LEVEL, NOISE_TYPES, OUTPUT_FORMATS,
    RESIZE_OPTIONS,
};
use maliced_core::MetadataMode;

use crate::app::MalicedApp;
use crate::ui::colors;

/// Render the options panel.
pub fn render(app: &mut MalicedApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());
    let mut changed = false;

    egui::ScrollArea::vertical().show(ui, |ui| {
        // ---------------------------------------------------------------------
        // Noise
        // ---------------------------------------------------------------------
        ui.heading("Noise");
        ui.separator();

        changed |= ui
            .add(egui::Slider::new(&mut app.settings.noise_level, 0..=MAX_NOISE_LEVEL).text("Level"))
            .changed();

        ui.label(RichText::new("Types").size(12.0).color(muted));
        for noise_type in NOISE_TYPES {
            let mut enabled = app.settings.noise_types.iter().any(|t| t == noise_type);
            if ui.checkbox(&mut enabled, display_name(noise_type)).changed() {
                if enabled {
                    app.settings.noise_types.push(noise_type.to_string());
                } else {
                    app.settings.noise_types.retain(|t| t != noise_type);
                }
                changed = true;
            }
        }

        ui.add_space(12.0);

        // ---------------------------------------------------------------------
        // Metadata
        // ---------------------------------------------------------------------
        ui.heading("Metadata");
        ui.separator();

        ui.horizontal(|ui| {
            for mode in MetadataMode::all() {
                changed |= ui
                    .radio_value(&mut app.settings.metadata_mode, *mode, mode.to_string())
                    .changed();
            }
        });

        if app.settings.metadata_mode == MetadataMode::Fake {
            changed |= choice_combo(
                ui,
                "Fake metadata",
                &mut app.settings.fake_metadata_type,
                FAKE_METADATA_TYPES,
            );
        }

        changed |= ui
            .checkbox(&mut app.settings.add_no_ai_flag, "Add \"no AI\" flag")
            .changed();

        ui.add_space(12.0);

        // ---------------------------------------------------------------------
        // Watermark
        // ---------------------------------------------------------------------
        ui.heading("Watermark");
        ui.separator();

        changed |= ui
            .checkbox(&mut app.settings.watermark_enabled, "Apply watermark")
            .changed();

        ui.add_enabled_ui(app.settings.watermark_enabled, |ui| {
            let selected = app
                .watermarks
                .iter()
                .find(|w| w.value == app.settings.watermark_path)
                .map(|w| w.display_name.clone())
                .unwrap_or_else(|| app.settings.watermark_path.clone());

            egui::ComboBox::from_label("Image")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    for entry in &app.watermarks {
                        changed |= ui
                            .selectable_value(
                                &mut app.settings.watermark_path,
                                entry.value.clone(),
                                entry.display_name.as_str(),
                            )
                            .changed();
                    }
                });

            if app.watermarks.is_empty() {
                ui.label(
                    RichText::new("No bundled watermarks found")
                        .size(11.0)
                        .color(muted),
                );
            }

            changed |= ui
                .checkbox(&mut app.settings.invert_watermark, "Invert colors")
                .changed();
            changed |= ui
                .checkbox(&mut app.settings.enable_outline, "Outline")
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut app.settings.watermark_opacity, 0..=100)
                        .text("Opacity")
                        .suffix("%"),
                )
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut app.settings.watermark_size, 1..=100)
                        .text("Size")
                        .suffix("%"),
                )
                .changed();
            changed |= choice_combo(
                ui,
                "Position",
                &mut app.settings.logo_position,
                LOGO_POSITIONS,
            );
        });

        ui.add_space(12.0);

        // ---------------------------------------------------------------------
        // Output
        // ---------------------------------------------------------------------
        ui.heading("Output");
        ui.separator();

        changed |= choice_combo(ui, "Resize", &mut app.settings.resize, RESIZE_OPTIONS);
        changed |= choice_combo(ui, "Format", &mut app.settings.output_format, OUTPUT_FORMATS);

        ui.horizontal(|ui| {
            if ui.button("Output Folder...").clicked() {
                app.open_output_dir_dialog();
            }
            if app.settings.output_dir.is_some() && ui.button("Use Default").clicked() {
                app.settings.output_dir = None;
                changed = true;
            }
        });
    });

    if changed {
        app.save_settings();
    }
}

/// Combo box over a fixed list of string values. Returns true on change.
fn choice_combo(ui: &mut egui::Ui, label: &str, current: &mut String, options: &[&str]) -> bool {
    let mut changed = false;
    egui::ComboBox::from_label(label)
        .selected_text(display_name(current.as_str()))
        .show_ui(ui, |ui| {
            for option in options {
                changed |= ui
                    .selectable_value(current, option.to_string(), display_name(option))
                    .changed();
            }
        });
    changed
}

/// "old_camera" -> "Old camera"
fn display_name(value: &str) -> String {
    let spaced = value.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
