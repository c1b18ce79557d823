//! Thumbnails of the selected image and the processed result.

use std::path::Path;

use eframe::egui;
use image::{DynamicImage, ImageReader};

/// Longest edge of a preview, in pixels.
const PREVIEW_SIZE: u32 = 360;

/// A decoded, downscaled image ready to draw.
#[derive(Clone)]
pub struct Preview {
    pub texture: egui::TextureHandle,
    /// Dimensions of the full image.
    pub width: u32,
    pub height: u32,
}

/// Decode `path` and upload a thumbnail texture.
pub fn load_preview(path: &Path, ctx: &egui::Context, name: &str) -> anyhow::Result<Preview> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let (width, height) = (img.width(), img.height());

    let thumbnail = img.thumbnail(PREVIEW_SIZE, PREVIEW_SIZE);
    Ok(Preview {
        texture: create_texture(ctx, &thumbnail, name),
        width,
        height,
    })
}

fn create_texture(ctx: &egui::Context, img: &DynamicImage, name: &str) -> egui::TextureHandle {
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let pixels = rgba.into_raw();

    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);

    ctx.load_texture(
        format!("preview-{}", name),
        color_image,
        egui::TextureOptions::LINEAR,
    )
}

/// Draw a preview scaled to fit `max_width`, with its caption.
pub fn show(ui: &mut egui::Ui, preview: &Preview, caption: &str, max_width: f32) {
    let tex_size = preview.texture.size_vec2();
    let scale = (max_width / tex_size.x).min(1.0);

    ui.vertical(|ui| {
        ui.add(egui::Image::new((preview.texture.id(), tex_size * scale)).rounding(4.0));
        ui.label(
            egui::RichText::new(format!("{} · {}×{}", caption, preview.width, preview.height))
                .size(11.0)
                .color(crate::ui::colors::muted(ui.visuals())),
        );
    });
}
