//! Bright-region localization.
//!
//! The box found here only decorates the displayed frame. It is derived from pixel brightness
//! alone and says nothing about where the classifier saw a hazard.
use common::prediction::BoundingBox;
use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    contours::{find_contours, BorderType},
    contrast::threshold,
    point::Point,
};

/// Gray values strictly above this count as bright.
pub const BRIGHTNESS_THRESHOLD: u8 = 200;

/// Find the bounding box of the largest bright region.
pub fn locate(frame: &RgbImage) -> Option<BoundingBox> {
    let gray = luma(frame);
    let binary = pad(&threshold(&gray, BRIGHTNESS_THRESHOLD));

    let mut largest: Option<(f64, Vec<Point<i32>>)> = None;
    for contour in find_contours::<i32>(&binary) {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let area = polygon_area(&contour.points);
        // First one wins on equal areas
        if largest.as_ref().map_or(true, |(best, _)| area > *best) {
            largest = Some((area, contour.points));
        }
    }

    // Shift back by the padding
    largest.and_then(|(_, points)| bounding_rect(&points, -1))
}

/// Gray value with BT.601 weights (0.299, 0.587, 0.114) in 14-bit fixed point.
fn luma(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        let value = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        Luma([value as u8])
    })
}

/// Surround the binary image with a one-pixel background border.
///
/// Border following only starts outer borders next to a background pixel on their left, so
/// regions touching the left edge would be missed without it.
fn pad(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    GrayImage::from_fn(width + 2, height + 2, |x, y| {
        if x == 0 || y == 0 || x > width || y > height {
            Luma([0])
        } else {
            *binary.get_pixel(x - 1, y - 1)
        }
    })
}

/// Area enclosed by a closed polygon (shoelace formula).
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    twice_area.abs() as f64 / 2.0
}

/// Inclusive axis-aligned bounding rectangle of the points, moved by `offset` on both axes.
fn bounding_rect(points: &[Point<i32>], offset: i32) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in points.iter() {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Some(BoundingBox::new(
        (min_x + offset).max(0) as u32,
        (min_y + offset).max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}
