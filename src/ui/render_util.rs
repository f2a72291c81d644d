use std::sync::Arc;

use gpui::RenderImage;
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    pipeline::skeleton::{draw_palm_regions, draw_skeleton},
    types::RecognizedFrame,
};

/// Wraps an RGBA buffer as a GPUI image. GPUI wants BGRA, so the channels are
/// swapped here instead of going through the async asset pipeline.
pub(super) fn rgba_to_image(mut rgba: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    if width == 0 || height == 0 {
        return None;
    }
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Camera preview with the palm boxes and hand skeleton painted on top.
pub(super) fn preview_image(recognized: &RecognizedFrame, pinched: bool) -> Option<Arc<RenderImage>> {
    let frame = &recognized.frame;
    let mut rgba = frame.rgba.clone();
    draw_palm_regions(
        &mut rgba,
        frame.width,
        frame.height,
        &recognized.result.palm_regions,
    );
    if let Some(points) = recognized.result.landmarks.as_deref() {
        draw_skeleton(&mut rgba, frame.width, frame.height, points, pinched);
    }
    rgba_to_image(rgba, frame.width, frame.height)
}
