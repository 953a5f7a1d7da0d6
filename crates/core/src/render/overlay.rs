use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

use crate::detection::domain::detection_result::DetectionResult;

const PALETTE: [[u8; 3]; 20] = [
    [255, 59, 48],
    [52, 199, 89],
    [0, 122, 255],
    [255, 149, 0],
    [175, 82, 222],
    [255, 204, 0],
    [90, 200, 250],
    [255, 45, 85],
    [88, 86, 214],
    [0, 199, 190],
    [162, 132, 94],
    [142, 142, 147],
    [48, 176, 199],
    [255, 105, 180],
    [50, 205, 50],
    [255, 215, 0],
    [138, 43, 226],
    [0, 206, 209],
    [255, 99, 71],
    [106, 90, 205],
];

const LINE_WIDTH: u32 = 2;
const GLYPH_SIZE: u32 = 8;
const LABEL_PADDING: u32 = 2;
const LABEL_HEIGHT: u32 = GLYPH_SIZE + 2 * LABEL_PADDING;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Stable colour per class, cycling through a fixed 20-entry palette.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Outlines each detection in its class colour with a filled label strip
/// above the box carrying `"<class> <pct>"` in white, pushed inside the
/// image when the box touches the top.
pub fn draw_detections(image: &mut RgbImage, detections: &[DetectionResult]) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }

    for det in detections {
        let color = class_color(det.class_id());
        let b = det.bounding_box().clamp_to(img_w as f32, img_h as f32);
        let x0 = b.x.floor() as u32;
        let y0 = b.y.floor() as u32;
        let x1 = (b.max_x().ceil() as u32).min(img_w);
        let y1 = (b.max_y().ceil() as u32).min(img_h);
        if x1 <= x0 || y1 <= y0 {
            continue;
        }

        let t = LINE_WIDTH;
        fill_rect(image, x0, y0, x1, (y0 + t).min(y1), color);
        fill_rect(image, x0, y1.saturating_sub(t).max(y0), x1, y1, color);
        fill_rect(image, x0, y0, (x0 + t).min(x1), y1, color);
        fill_rect(image, x1.saturating_sub(t).max(x0), y0, x1, y1, color);

        let label = det.label();
        let text_w = label.chars().count() as u32 * GLYPH_SIZE;
        let label_w = (text_w + 2 * LABEL_PADDING).min(img_w - x0);
        let label_y0 = y0.saturating_sub(LABEL_HEIGHT);
        fill_rect(
            image,
            x0,
            label_y0,
            x0 + label_w,
            (label_y0 + LABEL_HEIGHT).min(img_h),
            color,
        );
        draw_text(
            image,
            x0 + LABEL_PADDING,
            label_y0 + LABEL_PADDING,
            &label,
            x0 + label_w,
        );
    }
}

/// Draws `text` in the 8x8 bitmap font, clipped at `max_x` and the image.
fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, max_x: u32) {
    let (img_w, img_h) = image.dimensions();
    let max_x = max_x.min(img_w);
    for (i, c) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(c) else {
            continue;
        };
        let gx = x + i as u32 * GLYPH_SIZE;
        if gx >= max_x {
            break;
        }
        for (row, bits) in glyph.iter().enumerate() {
            let py = y + row as u32;
            if py >= img_h {
                break;
            }
            // Least significant bit is the leftmost pixel
            for col in 0..GLYPH_SIZE {
                let px = gx + col;
                if px < max_x && bits & (1 << col) != 0 {
                    image.put_pixel(px, py, TEXT_COLOR);
                }
            }
        }
    }
}

/// Fills the half-open rectangle `[x0, x1) x [y0, y1)`.
fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use rstest::rstest;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn detection(class_id: usize, bbox: BoundingBox) -> DetectionResult {
        DetectionResult::new(class_id, "dog", 0.87, bbox)
    }

    #[rstest]
    #[case(0, 20)]
    #[case(3, 23)]
    #[case(19, 39)]
    fn test_palette_wraps(#[case] a: usize, #[case] b: usize) {
        assert_eq!(class_color(a), class_color(b));
    }

    #[test]
    fn test_neighbouring_classes_differ() {
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn test_outline_leaves_interior() {
        let mut img = RgbImage::new(100, 100);
        draw_detections(&mut img, &[detection(1, BoundingBox::new(20.0, 40.0, 40.0, 40.0))]);
        let color = class_color(1);

        assert_eq!(img.get_pixel(20, 60), &color);
        assert_eq!(img.get_pixel(59, 60), &color);
        assert_eq!(img.get_pixel(40, 79), &color);
        assert_eq!(img.get_pixel(40, 60), &BLACK);
        assert_eq!(img.get_pixel(90, 90), &BLACK);
    }

    #[test]
    fn test_label_sits_above_box() {
        let mut img = RgbImage::new(100, 100);
        draw_detections(&mut img, &[detection(2, BoundingBox::new(20.0, 40.0, 40.0, 40.0))]);
        assert_eq!(img.get_pixel(22, 30), &class_color(2));
        assert_eq!(img.get_pixel(22, 20), &BLACK);
    }

    #[test]
    fn test_label_clamped_to_top_edge() {
        let mut img = RgbImage::new(100, 100);
        draw_detections(&mut img, &[detection(4, BoundingBox::new(10.0, 0.0, 30.0, 30.0))]);
        assert_eq!(img.get_pixel(15, 0), &class_color(4));
        assert_eq!(img.get_pixel(15, LABEL_HEIGHT - 1), &class_color(4));
    }

    #[test]
    fn test_label_text_is_drawn_in_white() {
        let mut img = RgbImage::new(120, 100);
        let det = detection(2, BoundingBox::new(20.0, 40.0, 80.0, 40.0));
        draw_detections(&mut img, std::slice::from_ref(&det));

        let strip_y0 = 40 - LABEL_HEIGHT;
        let white = (20..120)
            .flat_map(|x| (strip_y0..40).map(move |y| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y) == &TEXT_COLOR)
            .count();
        let expected: u32 = det
            .label()
            .chars()
            .filter_map(|c| BASIC_FONTS.get(c))
            .flat_map(|g| g.into_iter())
            .map(u8::count_ones)
            .sum();
        assert!(expected > 0);
        assert_eq!(white as u32, expected);
        // Nothing white leaks into the box itself
        assert!(img.pixels().skip((40 * 120) as usize).all(|p| *p != TEXT_COLOR));
    }

    #[test]
    fn test_label_text_clipped_at_image_edge() {
        let mut img = RgbImage::new(30, 30);
        draw_detections(&mut img, &[detection(0, BoundingBox::new(20.0, 15.0, 10.0, 10.0))]);
        assert_eq!(img.dimensions(), (30, 30));
        assert_eq!(img.get_pixel(20, 15 - LABEL_HEIGHT), &class_color(0));
    }

    #[test]
    fn test_box_past_edge_is_clipped() {
        let mut img = RgbImage::new(50, 50);
        draw_detections(&mut img, &[detection(0, BoundingBox::new(30.0, 30.0, 80.0, 80.0))]);
        assert_eq!(img.get_pixel(49, 40), &class_color(0));
    }

    #[test]
    fn test_box_outside_image_draws_nothing() {
        let mut img = RgbImage::new(50, 50);
        draw_detections(&mut img, &[detection(0, BoundingBox::new(60.0, 60.0, 10.0, 10.0))]);
        assert!(img.pixels().all(|p| *p == BLACK));
    }
}
