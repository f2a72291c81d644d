//! Tensor preparation and landmark projection shared by the palm detector and
//! the handpose estimator.

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;
pub const NUM_LANDMARKS: usize = 21;

/// How a frame was scaled and padded into a square model input.
#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Square, rotated crop of a frame around a detected palm.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {expected}",
            frame.rgba.len()
        ));
    }
    Ok(())
}

/// Resizes the frame to fit `target_size` keeping aspect ratio, centres it on
/// a black square and returns an NHWC tensor with channels in 0..1.
pub fn letterbox_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("cannot letterbox an empty frame"));
    }

    let scale = target_size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let side = target_size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let mut square = vec![0u8; side * side * 4];
    let row_bytes = new_w as usize * 4;
    for (row, src_row) in resized.chunks_exact(row_bytes).enumerate() {
        let offset = ((pad_y + row) * side + pad_x) * 4;
        square[offset..offset + row_bytes].copy_from_slice(src_row);
    }

    let normalized: Vec<f32> = square
        .par_chunks_exact(4)
        .flat_map_iter(|px| px[..3].iter().map(|&c| c as f32 / 255.0).collect::<Vec<_>>())
        .collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }
    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

/// Samples a rotated square of `side` source pixels around `center` into an
/// `output_size`² NHWC tensor.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let n = output_size as usize;
    let data: Vec<f32> = (0..n * n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let (x, y) = ((i % n) as f32 + 0.5, (i / n) as f32 + 0.5);
            let (sx, sy) = transform.to_source(x, y);
            sample_rgb(frame, sx, sy)
        })
        .collect();

    let array = Array4::<f32>::from_shape_vec((1, n, n, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;
    Ok((array, transform))
}

impl CropTransform {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let (dx, dy) = ((x - half) * scale, (y - half) * scale);
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Maps a point in crop space back to frame pixels, clamped to the frame.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let (ox, oy) = self.to_source(x, y);
        (
            ox.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            oy.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
        )
    }

    pub fn project_landmarks(&self, landmarks: &[[f32; 3]]) -> Vec<(f32, f32)> {
        landmarks
            .iter()
            .map(|[x, y, _z]| self.project(*x, *y))
            .collect()
    }
}

/// Bilinear RGB sample; outside the frame reads as black.
fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i64, cy as i64);
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let (c00, c10) = (fetch(x0, y0), fetch(x0 + 1.0, y0));
    let (c01, c11) = (fetch(x0, y0 + 1.0), fetch(x0 + 1.0, y0 + 1.0));
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [255, 0, 0]);
        let (input, info) = letterbox_frame(&frame, 16).unwrap();
        assert_eq!(input.shape(), &[1, 16, 16, 3]);
        assert_eq!(info.scale, 0.25);
        assert_eq!(info.pad_x, 0.0);
        assert_eq!(info.pad_y, 4.0);
        // Padding rows stay black, image rows carry the frame colour.
        assert_eq!(input[[0, 0, 8, 0]], 0.0);
        assert!((input[[0, 8, 8, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn letterbox_rejects_mismatched_buffers() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.rgba.pop();
        assert!(letterbox_frame(&frame, 8).is_err());
    }

    #[test]
    fn landmarks_need_all_21_points() {
        assert!(decode_landmarks(&[0.0; 60]).is_err());
        let flat: Vec<f32> = (0..66).map(|v| v as f32).collect();
        let points = decode_landmarks(&flat).unwrap();
        assert_eq!(points.len(), NUM_LANDMARKS);
        assert_eq!(points[1], [3.0, 4.0, 5.0]);
    }

    #[test]
    fn unrotated_crop_projects_centre_to_centre() {
        let transform = CropTransform {
            center: (100.0, 80.0),
            side: 50.0,
            angle: 0.0,
            output_size: 10,
            orig_w: 200,
            orig_h: 160,
        };
        assert_eq!(transform.project(5.0, 5.0), (100.0, 80.0));
        assert_eq!(transform.project(10.0, 0.0), (125.0, 55.0));
    }

    #[test]
    fn quarter_turn_crop_rotates_offsets() {
        let transform = CropTransform {
            center: (50.0, 50.0),
            side: 10.0,
            angle: std::f32::consts::FRAC_PI_2,
            output_size: 10,
            orig_w: 100,
            orig_h: 100,
        };
        let (x, y) = transform.project(10.0, 5.0);
        assert!((x - 50.0).abs() < 1e-3);
        assert!((y - 55.0).abs() < 1e-3);
    }

    #[test]
    fn crop_outside_frame_samples_black() {
        let frame = solid_frame(8, 8, [255, 255, 255]);
        let (input, _) = prepare_rotated_crop(&frame, (-100.0, -100.0), 8.0, 0.0, 4).unwrap();
        assert!(input.iter().all(|&v| v == 0.0));
    }
}
