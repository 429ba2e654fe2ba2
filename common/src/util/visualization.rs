use crate::board::model::{BoardModel, PadShape};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect as ImageRect;
use image::{Rgba, RgbaImage};
use std::path::Path;

const MARGIN_MM: f64 = 1.0;

const LAYER_COLORS: [Rgba<u8>; 8] = [
    // Top copper: red
    Rgba([255, 40, 70, 200]),
    // Inner 1: blue
    Rgba([0, 110, 255, 170]),
    // Inner 2: green
    Rgba([0, 220, 100, 170]),
    // Inner 3: gold
    Rgba([255, 215, 0, 170]),
    // Inner 4: violet
    Rgba([180, 50, 255, 170]),
    // Inner 5: cyan
    Rgba([0, 240, 255, 170]),
    // Inner 6: orange
    Rgba([255, 140, 0, 170]),
    // Bottom copper: grey
    Rgba([160, 160, 170, 170]),
];

pub fn layer_color(layer: u8) -> Rgba<u8> {
    LAYER_COLORS[layer as usize % LAYER_COLORS.len()]
}

pub fn draw_routed_board(board: &BoardModel, filename: &str, width: u32, height: u32) {
    let w = width.max(4000);
    let h = height.max(4000);
    let mut img = RgbaImage::from_pixel(w, h, Rgba([8, 10, 14, 255]));

    let Some(bounds) = board.bounding_box() else {
        return;
    };
    let bounds = bounds.expand(MARGIN_MM);
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return;
    }

    let scale = (w as f64 / bounds.width()).min(h as f64 / bounds.height());

    // Image y runs down, board y runs up.
    let map = |x: f64, y: f64| {
        (
            (x - bounds.min.x) * scale,
            h as f64 - (y - bounds.min.y) * scale,
        )
    };

    let keepout_color = Rgba([70, 30, 30, 255]);
    for k in &board.keepouts {
        let (x0, y1) = map(k.rect.min.x, k.rect.min.y);
        let (x1, y0) = map(k.rect.max.x, k.rect.max.y);
        let rect = ImageRect::at(x0 as i32, y0 as i32)
            .of_size((x1 - x0).max(1.0) as u32, (y1 - y0).max(1.0) as u32);
        draw_filled_rect_mut(&mut img, rect, keepout_color);
    }

    let pad_color = Rgba([190, 160, 70, 255]);
    for p in &board.pads {
        let (cx, cy) = map(p.pos.x, p.pos.y);
        match p.shape {
            PadShape::Circle => {
                let r = (p.size.x / 2.0 * scale).max(1.0);
                draw_filled_circle_mut(&mut img, (cx as i32, cy as i32), r as i32, pad_color);
            }
            PadShape::Rect => {
                let hw = (p.size.x / 2.0 * scale).max(1.0);
                let hh = (p.size.y / 2.0 * scale).max(1.0);
                let rect = ImageRect::at((cx - hw) as i32, (cy - hh) as i32)
                    .of_size((hw * 2.0) as u32, (hh * 2.0) as u32);
                draw_filled_rect_mut(&mut img, rect, pad_color);
            }
        }
    }

    let mut tracks: Vec<_> = board.tracks.iter().collect();
    tracks.sort_by_key(|t| std::cmp::Reverse(t.layer));

    for t in tracks {
        let (x1, y1) = map(t.start.x, t.start.y);
        let (x2, y2) = map(t.end.x, t.end.y);
        let radius = (t.width / 2.0 * scale).max(1.0);
        stamp_segment(&mut img, x1, y1, x2, y2, radius, layer_color(t.layer));
    }

    let via_ring = Rgba([240, 240, 240, 255]);
    let via_hole = Rgba([8, 10, 14, 255]);
    for v in &board.vias {
        let (cx, cy) = map(v.pos.x, v.pos.y);
        let r_outer = (v.diameter / 2.0 * scale).max(2.0);
        let r_drill = (v.drill / 2.0 * scale).max(1.0);
        draw_filled_circle_mut(&mut img, (cx as i32, cy as i32), r_outer as i32, via_ring);
        draw_filled_circle_mut(&mut img, (cx as i32, cy as i32), r_drill as i32, via_hole);
    }

    if width < w || height < h {
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Lanczos3);
        if let Err(e) = resized.save(Path::new(filename)) {
            log::warn!("Could not save render to {}: {}", filename, e);
        }
    } else if let Err(e) = img.save(Path::new(filename)) {
        log::warn!("Could not save render to {}: {}", filename, e);
    }
}

/// draw_line_segment_mut is one pixel wide; stamp circles along the segment
/// so track width survives at render scale.
fn stamp_segment(img: &mut RgbaImage, x1: f64, y1: f64, x2: f64, y2: f64, radius: f64, color: Rgba<u8>) {
    let (dx, dy) = (x2 - x1, y2 - y1);
    let length = (dx * dx + dy * dy).sqrt();
    let steps = (length / (radius * 0.5).max(1.0)).ceil().max(1.0) as u32;
    for i in 0..=steps {
        let t = f64::from(i) / f64::from(steps);
        let cx = x1 + dx * t;
        let cy = y1 + dy * t;
        draw_filled_circle_mut(img, (cx as i32, cy as i32), radius as i32, color);
    }
}
