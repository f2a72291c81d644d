//! Hand skeleton overlay for the camera preview.

use crate::{
    board::raster::{self, Rgba},
    gesture::{INDEX_FINGER_TIP, THUMB_TIP},
    types::PalmRegion,
};

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

const BONE_COLOR: Rgba = [56, 189, 248, 255];
const JOINT_COLOR: Rgba = [248, 113, 113, 255];
const PEN_TIP_COLOR: Rgba = [250, 204, 21, 255];
const PINCHED_COLOR: Rgba = [34, 197, 94, 255];
const PALM_BOX_COLOR: Rgba = [16, 185, 129, 200];
const PALM_SCORE_THRESHOLD: f32 = 0.25;

/// Draws bones, joints and the two pen fingertips. `pinched` highlights the
/// tips so the user can see when the pen is down.
pub fn draw_skeleton(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    points: &[(f32, f32)],
    pinched: bool,
) {
    if points.len() < 2 {
        return;
    }
    let scale = (width.max(height) / 320).max(1) as i32;

    for &(a, b) in CONNECTIONS {
        if let (Some(&pa), Some(&pb)) = (points.get(a), points.get(b)) {
            raster::draw_segment(buffer, width, height, pa, pb, BONE_COLOR, scale);
        }
    }

    for &(x, y) in points {
        raster::fill_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            scale + 1,
            JOINT_COLOR,
        );
    }

    let tip_color = if pinched { PINCHED_COLOR } else { PEN_TIP_COLOR };
    for tip in [THUMB_TIP, INDEX_FINGER_TIP] {
        if let Some(&(x, y)) = points.get(tip) {
            raster::fill_circle(
                buffer,
                width,
                height,
                (x as i32, y as i32),
                scale * 3,
                tip_color,
            );
        }
    }
}

pub fn draw_palm_regions(buffer: &mut [u8], width: u32, height: u32, regions: &[PalmRegion]) {
    for region in regions.iter().filter(|r| r.score >= PALM_SCORE_THRESHOLD) {
        raster::stroke_rect(buffer, width, height, region.bbox, PALM_BOX_COLOR, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buf: &[u8], width: u32, x: u32, y: u32) -> Rgba {
        let idx = ((y * width + x) * 4) as usize;
        [buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]]
    }

    fn hand() -> Vec<(f32, f32)> {
        (0..21).map(|i| (10.0 + i as f32 * 4.0, 50.0)).collect()
    }

    #[test]
    fn pen_tips_change_colour_when_pinched() {
        let mut buf = vec![0u8; 120 * 100 * 4];
        draw_skeleton(&mut buf, 120, 100, &hand(), false);
        assert_eq!(pixel(&buf, 120, 42, 50), PEN_TIP_COLOR);

        draw_skeleton(&mut buf, 120, 100, &hand(), true);
        assert_eq!(pixel(&buf, 120, 42, 50), PINCHED_COLOR);
    }

    #[test]
    fn too_few_points_draw_nothing() {
        let mut buf = vec![0u8; 10 * 10 * 4];
        draw_skeleton(&mut buf, 10, 10, &[(5.0, 5.0)], false);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn weak_palms_are_not_outlined() {
        let mut buf = vec![0u8; 20 * 20 * 4];
        let weak = PalmRegion {
            bbox: [2.0, 2.0, 15.0, 15.0],
            landmarks: Vec::new(),
            score: 0.1,
        };
        draw_palm_regions(&mut buf, 20, 20, &[weak]);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
