//! Central panel: image selection, processing and metadata.

use eframe::egui::{self, RichText, Rounding, Vec2};
use serde_json::Value;

use crate::app::MalicedApp;
use crate::ui::{colors, preview};

/// Render the central panel.
pub fn render(app: &mut MalicedApp, ui: &mut egui::Ui) {
    let muted = colors::muted(ui.visuals());

    render_drop_area(app, ui, muted);

    if app.input_preview.is_some() || app.output_preview.is_some() {
        ui.add_space(8.0);
        let column_width = ((ui.available_width() - 16.0) / 2.0).max(120.0);
        ui.horizontal_top(|ui| {
            if let Some(input) = &app.input_preview {
                preview::show(ui, input, "Original", column_width);
            }
            if let Some(output) = &app.output_preview {
                preview::show(ui, output, "Processed", column_width);
            }
        });
    }

    ui.add_space(12.0);

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------
    let has_image = app.selected_image.is_some();
    let can_process = has_image && !app.is_processing() && app.python_ready();

    ui.horizontal(|ui| {
        if ui
            .add_enabled(
                can_process,
                egui::Button::new(RichText::new("Process").strong())
                    .fill(colors::ACCENT)
                    .rounding(Rounding::same(8.0))
                    .min_size(Vec2::new(100.0, 30.0)),
            )
            .clicked()
        {
            app.process_image();
        }

        if ui
            .add_enabled(
                has_image && !app.is_loading_metadata() && app.python_ready(),
                egui::Button::new("Metadata")
                    .rounding(Rounding::same(8.0))
                    .min_size(Vec2::new(100.0, 30.0)),
            )
            .clicked()
        {
            app.load_metadata();
        }

        if app.is_processing() || app.is_loading_metadata() {
            ui.spinner();
        }
    });

    if !app.python_ready() {
        ui.horizontal(|ui| {
            ui.label(
                RichText::new("Python is not set up yet.")
                    .size(12.0)
                    .color(colors::ERROR),
            );
            if !app.setup_in_progress() && ui.link("Run setup").clicked() {
                app.start_setup(false);
            }
        });
    }

    // -------------------------------------------------------------------------
    // Result
    // -------------------------------------------------------------------------
    let mut reveal = None;
    match &app.last_result {
        Some(Ok(outcome)) => {
            ui.add_space(8.0);
            ui.label(RichText::new("Saved to").size(12.0).color(muted));
            ui.label(
                RichText::new(outcome.output_path.display().to_string())
                    .monospace()
                    .color(colors::SUCCESS),
            );
            if !outcome.message.is_empty() {
                ui.label(RichText::new(&outcome.message).size(11.0).color(muted));
            }
            if ui.button("Show in Folder").clicked() {
                reveal = Some(outcome.clone());
            }
        }
        Some(Err(e)) => {
            ui.add_space(8.0);
            ui.label(RichText::new(e).color(colors::ERROR));
        }
        None => {}
    }
    if let Some(outcome) = reveal {
        app.reveal_output(&outcome);
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------
    if let Some(metadata) = &app.metadata {
        ui.add_space(12.0);
        ui.heading("Metadata");
        ui.separator();

        match metadata {
            Ok(fields) if fields.is_empty() => {
                ui.label(RichText::new("No metadata found").color(muted));
            }
            Ok(fields) => {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    egui::Grid::new("metadata_grid")
                        .num_columns(2)
                        .striped(true)
                        .show(ui, |ui| {
                            for (key, value) in fields {
                                ui.label(RichText::new(key).strong());
                                ui.label(RichText::new(value_text(value)).monospace());
                                ui.end_row();
                            }
                        });
                });
            }
            Err(e) => {
                ui.label(RichText::new(e).color(colors::ERROR));
            }
        }
    }
}

fn render_drop_area(app: &mut MalicedApp, ui: &mut egui::Ui, muted: egui::Color32) {
    let hovering = ui.ctx().input(|i| !i.raw.hovered_files.is_empty());
    let stroke_color = if hovering {
        colors::ACCENT
    } else {
        colors::border(ui.visuals())
    };

    egui::Frame::none()
        .fill(colors::drop_bg(ui.visuals()))
        .stroke(egui::Stroke::new(1.0, stroke_color))
        .rounding(Rounding::same(8.0))
        .inner_margin(egui::Margin::same(16.0))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.vertical_centered(|ui| {
                match &app.selected_image {
                    Some(image) => {
                        ui.label(RichText::new(&image.original_name).strong().size(15.0));
                        ui.label(
                            RichText::new(image.path.display().to_string())
                                .size(11.0)
                                .color(muted),
                        );
                    }
                    None => {
                        ui.label(
                            RichText::new("Drop an image here")
                                .size(15.0)
                                .color(muted),
                        );
                        ui.label(
                            RichText::new("PNG, JPEG or WebP")
                                .size(11.0)
                                .color(muted),
                        );
                    }
                }
                ui.add_space(6.0);
                if ui.button("Choose Image...").clicked() {
                    app.open_image_dialog();
                }
            });
        });
}

/// Strings are shown without quotes; everything else as compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
