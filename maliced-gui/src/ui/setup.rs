//! Python setup window.

use eframe::egui::{self, RichText, Rounding, Vec2};

use crate::app::{MalicedApp, SetupState};
use crate::ui::colors;

/// Render the setup window.
pub fn render(app: &mut MalicedApp, ctx: &egui::Context) {
    let muted = colors::muted(&ctx.style().visuals);
    let running = matches!(app.setup_state, SetupState::Running { .. });

    let mut check_clicked = false;
    let mut reinstall_clicked = false;
    let mut restart_clicked = false;
    let mut close_clicked = false;

    egui::Window::new("Python Setup")
        .collapsible(false)
        .resizable(false)
        .default_width(440.0)
        .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
        .show(ctx, |ui| {
            ui.spacing_mut().item_spacing = Vec2::new(8.0, 10.0);

            match &app.setup_state {
                SetupState::Idle => {
                    ui.label(
                        RichText::new(
                            "Maliced runs a bundled Python environment. \
                             Check it to install anything that is missing.",
                        )
                        .size(12.0)
                        .color(muted),
                    );
                }
                SetupState::Running { force, progress } => {
                    let heading = if *force {
                        "Reinstalling Python..."
                    } else if app.startup_setup {
                        "Preparing Python for first use..."
                    } else {
                        "Checking Python setup..."
                    };
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(RichText::new(heading).strong());
                    });
                    ui.add(
                        egui::ProgressBar::new(f32::from(*progress) / 100.0)
                            .show_percentage()
                            .animate(true),
                    );
                    ui.label(
                        RichText::new("This can take a few minutes on the first run.")
                            .size(11.0)
                            .color(muted),
                    );
                }
                SetupState::Finished(outcome) => {
                    let color = if outcome.success {
                        colors::SUCCESS
                    } else {
                        colors::ERROR
                    };
                    ui.label(RichText::new(&outcome.message).color(color));

                    if let Some(report) = &outcome.report {
                        egui::CollapsingHeader::new("Details")
                            .default_open(!report.all_ok())
                            .show(ui, |ui| {
                                egui::Grid::new("setup_steps")
                                    .num_columns(2)
                                    .striped(true)
                                    .show(ui, |ui| {
                                        for step in
                                            std::iter::once(&report.bootstrap).chain(&report.libraries)
                                        {
                                            let (mark, color) = if step.ok {
                                                ("✓", colors::SUCCESS)
                                            } else {
                                                ("✗", colors::ERROR)
                                            };
                                            ui.label(
                                                RichText::new(format!("{} {}", mark, step.name))
                                                    .color(color),
                                            );
                                            ui.label(
                                                RichText::new(&step.detail).size(11.0).color(muted),
                                            );
                                            ui.end_row();
                                        }
                                    });
                            });
                    }

                    if outcome.success {
                        ui.label(
                            RichText::new("Restart Maliced to use the updated environment.")
                                .size(12.0)
                                .color(muted),
                        );
                    }
                }
            }

            ui.separator();

            // Footer buttons
            ui.horizontal(|ui| {
                let succeeded =
                    matches!(&app.setup_state, SetupState::Finished(outcome) if outcome.success);

                if succeeded {
                    if ui
                        .add_sized(
                            Vec2::new(100.0, 30.0),
                            egui::Button::new(RichText::new("Restart").strong())
                                .fill(colors::ACCENT)
                                .rounding(Rounding::same(8.0)),
                        )
                        .clicked()
                    {
                        restart_clicked = true;
                    }
                }

                let check_label = if matches!(app.setup_state, SetupState::Finished(ref o) if !o.success)
                {
                    "Retry"
                } else {
                    "Check"
                };
                if ui
                    .add_enabled(
                        !running,
                        egui::Button::new(check_label).rounding(Rounding::same(8.0)),
                    )
                    .clicked()
                {
                    check_clicked = true;
                }

                if ui
                    .add_enabled(
                        !running,
                        egui::Button::new("Reinstall").rounding(Rounding::same(8.0)),
                    )
                    .clicked()
                {
                    reinstall_clicked = true;
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .add_enabled(
                            !running,
                            egui::Button::new("Close").rounding(Rounding::same(8.0)),
                        )
                        .clicked()
                    {
                        close_clicked = true;
                    }
                });
            });
        });

    if restart_clicked {
        app.restart(ctx);
    } else if check_clicked {
        app.start_setup(false);
    } else if reinstall_clicked {
        app.start_setup(true);
    } else if close_clicked {
        app.show_setup_dialog = false;
    }
}
