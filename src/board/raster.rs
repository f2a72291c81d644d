//! Minimal RGBA rasterization shared by the board and the camera overlay.

pub type Rgba = [u8; 4];

/// Stamps a filled disc of `radius` at every step of a Bresenham walk from `p0`
/// to `p1`, which gives thick segments with round caps.
pub fn draw_segment(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: Rgba,
    radius: i32,
) {
    walk_line(p0, p1, |x, y| {
        fill_circle(buffer, width, height, (x, y), radius, color)
    });
}

/// Like [`draw_segment`], but sized by line width in pixels so that every
/// width step inks a visibly different line.
pub fn draw_wide_segment(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: Rgba,
    line_width: u32,
) {
    walk_line(p0, p1, |x, y| {
        stamp_disc(buffer, width, height, (x, y), line_width, color)
    });
}

fn walk_line(p0: (f32, f32), p1: (f32, f32), mut plot: impl FnMut(i32, i32)) {
    let (mut x0, mut y0) = (p0.0.round() as i32, p0.1.round() as i32);
    let (x1, y1) = (p1.0.round() as i32, p1.1.round() as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        plot(x0, y0);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Fills a disc `diameter` pixels across around `center`. Pixels are tested
/// from their centres; odd diameters are centred on the pixel, even ones on
/// its top-left corner.
pub fn stamp_disc(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    diameter: u32,
    color: Rgba,
) {
    let diameter = diameter.max(1);
    let r = diameter as f32 / 2.0;
    let offset = if diameter % 2 == 1 { 0.5 } else { 0.0 };
    let (cx, cy) = (center.0 as f32 + offset, center.1 as f32 + offset);
    let reach = (diameter / 2 + 1) as i32;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let (x, y) = (center.0 + dx, center.1 + dy);
            let px = x as f32 + 0.5 - cx;
            let py = y as f32 + 0.5 - cy;
            if px * px + py * py <= r * r {
                put_pixel_safe(buffer, width, height, x, y, color);
            }
        }
    }
}

pub fn fill_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: Rgba,
) {
    let (cx, cy) = center;
    if radius <= 0 {
        put_pixel_safe(buffer, width, height, cx, cy, color);
        return;
    }
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

pub fn stroke_rect(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    bbox: [f32; 4],
    color: Rgba,
    radius: i32,
) {
    let [x1, y1, x2, y2] = bbox;
    let corners = [(x1, y1), (x2, y1), (x2, y2), (x1, y2)];
    for i in 0..corners.len() {
        let next = corners[(i + 1) % corners.len()];
        draw_segment(buffer, width, height, corners[i], next, color, radius);
    }
}

pub fn fill(buffer: &mut [u8], color: Rgba) {
    for px in buffer.chunks_exact_mut(4) {
        px.copy_from_slice(&color);
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: Rgba) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba = [255, 255, 255, 255];

    fn pixel(buffer: &[u8], width: u32, x: u32, y: u32) -> Rgba {
        let idx = ((y * width + x) * 4) as usize;
        [buffer[idx], buffer[idx + 1], buffer[idx + 2], buffer[idx + 3]]
    }

    #[test]
    fn segment_covers_both_endpoints() {
        let mut buf = vec![0u8; 10 * 10 * 4];
        draw_segment(&mut buf, 10, 10, (1.0, 1.0), (8.0, 5.0), WHITE, 0);
        assert_eq!(pixel(&buf, 10, 1, 1), WHITE);
        assert_eq!(pixel(&buf, 10, 8, 5), WHITE);
        assert_eq!(pixel(&buf, 10, 8, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn thick_segment_widens_perpendicular() {
        let mut buf = vec![0u8; 20 * 20 * 4];
        draw_segment(&mut buf, 20, 20, (5.0, 10.0), (15.0, 10.0), WHITE, 2);
        assert_eq!(pixel(&buf, 20, 10, 8), WHITE);
        assert_eq!(pixel(&buf, 20, 10, 12), WHITE);
        assert_eq!(pixel(&buf, 20, 10, 13), [0, 0, 0, 0]);
    }

    #[test]
    fn drawing_outside_the_buffer_is_clipped() {
        let mut buf = vec![0u8; 4 * 4 * 4];
        draw_segment(&mut buf, 4, 4, (-10.0, -10.0), (10.0, 10.0), WHITE, 1);
        fill_circle(&mut buf, 4, 4, (100, 100), 3, WHITE);
        assert_eq!(pixel(&buf, 4, 2, 2), WHITE);
    }

    fn inked(buffer: &[u8]) -> usize {
        buffer.chunks_exact(4).filter(|px| *px == WHITE).count()
    }

    #[test]
    fn every_line_width_inks_more_than_the_last() {
        let counts: Vec<usize> = (1..=15)
            .map(|line_width| {
                let mut buf = vec![0u8; 40 * 40 * 4];
                stamp_disc(&mut buf, 40, 40, (20, 20), line_width, WHITE);
                inked(&buf)
            })
            .collect();
        assert_eq!(&counts[..4], &[1, 4, 9, 12]);
        assert!(counts.windows(2).all(|w| w[0] < w[1]), "{counts:?}");
    }

    #[test]
    fn wide_segment_thickness_follows_width() {
        let mut thin = vec![0u8; 20 * 20 * 4];
        let mut wide = vec![0u8; 20 * 20 * 4];
        draw_wide_segment(&mut thin, 20, 20, (5.0, 10.0), (15.0, 10.0), WHITE, 2);
        draw_wide_segment(&mut wide, 20, 20, (5.0, 10.0), (15.0, 10.0), WHITE, 3);
        assert!(inked(&thin) < inked(&wide));
        assert_eq!(pixel(&thin, 20, 10, 9), WHITE);
        assert_eq!(pixel(&thin, 20, 10, 11), [0, 0, 0, 0]);
        assert_eq!(pixel(&wide, 20, 10, 11), WHITE);
    }

    #[test]
    fn rect_outline_leaves_interior_untouched() {
        let mut buf = vec![0u8; 12 * 12 * 4];
        stroke_rect(&mut buf, 12, 12, [1.0, 1.0, 10.0, 10.0], WHITE, 0);
        assert_eq!(pixel(&buf, 12, 1, 5), WHITE);
        assert_eq!(pixel(&buf, 12, 10, 10), WHITE);
        assert_eq!(pixel(&buf, 12, 5, 5), [0, 0, 0, 0]);
    }
}
