//! Annotation of frames with the classification result.
//!
use common::prediction::{BoundingBox, Label, Prediction};
use image::{codecs::jpeg::JpegEncoder, ColorType, ImageResult, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use lazy_static::lazy_static;

pub const NEUTRAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const HAZARD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Height of the annotation text in pixels.
const TEXT_HEIGHT: i32 = 20;

/// Color used to annotate a label: green for a safe scene, red for hazards.
pub fn label_color(label: Label) -> Rgb<u8> {
    if label.is_hazardous() {
        HAZARD_COLOR
    } else {
        NEUTRAL_COLOR
    }
}

/// Burn the bounding box (if any) and `"<label> <confidence>%"` into the frame.
///
/// The text sits above the box, or in the top left corner when there is no box.
pub fn render(
    mut frame: RgbImage,
    bbox: Option<BoundingBox>,
    prediction: &Prediction,
    color: Rgb<u8>,
) -> RgbImage {
    // Baseline of the text, the drawing functions want its top
    let (text_x, baseline) = match bbox {
        Some(bbox) if bbox.width > 0 && bbox.height > 0 => {
            draw_frame_rect(&mut frame, bbox, color);
            (bbox.x as i32, i32::max(10, bbox.y as i32 - 10))
        }
        _ => (10, 30),
    };
    let text_y = (baseline - TEXT_HEIGHT).max(0);

    draw_text_mut(
        &mut frame,
        color,
        text_x,
        text_y,
        rusttype::Scale::uniform(TEXT_HEIGHT as f32),
        &DEJAVU_MONO,
        &prediction.to_string(),
    );

    frame
}

/// Two pixel wide hollow rectangle.
fn draw_frame_rect(frame: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>) {
    let outer = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height);
    draw_hollow_rect_mut(frame, outer, color);

    if bbox.width > 2 && bbox.height > 2 {
        let inner =
            Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1).of_size(bbox.width - 2, bbox.height - 2);
        draw_hollow_rect_mut(frame, inner, color);
    }
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;

    Ok(buf)
}

lazy_static! {
    static ref DEJAVU_MONO: rusttype::Font<'static> = {
        let font_data: &[u8] = include_bytes!("../resources/DejaVuSansMono.ttf");
        let font: rusttype::Font<'static> =
            rusttype::Font::try_from_bytes(font_data).expect("failed to load font");
        font
    };
}
