//! Turns hand landmarks into pen events for the board.
//!
//! The pen goes down when the thumb tip and index fingertip pinch together and
//! follows the index fingertip until they separate again. Landmarks arrive in
//! camera frame pixels; the pen position is remapped to canvas pixels.

use crate::{config::AppConfig, types::HandTracking};

pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PenEvent {
    Down((f32, f32)),
    Move((f32, f32)),
    Up,
}

#[derive(Clone, Debug)]
pub struct PinchConfig {
    pub pinch_threshold: f32,
    pub release_threshold: f32,
    /// Exponential smoothing factor for the pen position; 1.0 disables smoothing.
    pub smoothing: f32,
    pub min_confidence: f32,
    /// Flip the camera x axis when mapping to the canvas. Needed when the frames
    /// are not already mirrored, so the pen follows the hand as seen by the user.
    pub flip_x: bool,
}

impl Default for PinchConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.1,
            release_threshold: 0.12,
            smoothing: 1.0,
            min_confidence: 0.5,
            flip_x: false,
        }
    }
}

impl From<&AppConfig> for PinchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pinch_threshold: config.pinch_threshold,
            release_threshold: config.release_threshold.max(config.pinch_threshold),
            smoothing: config.smoothing,
            min_confidence: config.min_hand_confidence,
            flip_x: !config.mirror_camera,
        }
    }
}

/// Pinch state between frames.
#[derive(Debug)]
pub struct PinchTracker {
    cfg: PinchConfig,
    drawing: bool,
    last_point: Option<(f32, f32)>,
}

impl PinchTracker {
    pub fn new(cfg: PinchConfig) -> Self {
        Self {
            cfg,
            drawing: false,
            last_point: None,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Feeds one recognized frame. `frame_size` is the camera frame the
    /// landmarks refer to, `canvas_size` the board in pixels.
    pub fn update(
        &mut self,
        tracking: &HandTracking,
        frame_size: (u32, u32),
        canvas_size: (u32, u32),
    ) -> Option<PenEvent> {
        let landmarks = tracking
            .landmarks
            .as_deref()
            .filter(|_| tracking.confidence >= self.cfg.min_confidence);

        let Some(landmarks) = landmarks else {
            return self.release();
        };
        let Some(hand) = normalized_tips(landmarks, frame_size) else {
            return self.release();
        };
        if canvas_size.0 == 0 || canvas_size.1 == 0 {
            return self.release();
        }

        let threshold = if self.drawing {
            self.cfg.release_threshold
        } else {
            self.cfg.pinch_threshold
        };
        if hand.pinch_distance() >= threshold {
            return self.release();
        }

        let target = map_to_canvas(hand.index, canvas_size, self.cfg.flip_x);
        if self.drawing {
            let point = self.smooth(target);
            self.last_point = Some(point);
            Some(PenEvent::Move(point))
        } else {
            self.drawing = true;
            self.last_point = Some(target);
            Some(PenEvent::Down(target))
        }
    }

    /// Ends any stroke in progress, e.g. when gesture input is paused.
    pub fn release(&mut self) -> Option<PenEvent> {
        self.last_point = None;
        if self.drawing {
            self.drawing = false;
            Some(PenEvent::Up)
        } else {
            None
        }
    }

    fn smooth(&self, target: (f32, f32)) -> (f32, f32) {
        let alpha = self.cfg.smoothing.clamp(0.0, 1.0);
        match self.last_point {
            Some((px, py)) => (px + (target.0 - px) * alpha, py + (target.1 - py) * alpha),
            None => target,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct NormalizedTips {
    thumb: (f32, f32),
    index: (f32, f32),
}

impl NormalizedTips {
    fn pinch_distance(&self) -> f32 {
        (self.index.0 - self.thumb.0).hypot(self.index.1 - self.thumb.1)
    }
}

fn normalized_tips(landmarks: &[(f32, f32)], frame_size: (u32, u32)) -> Option<NormalizedTips> {
    let (w, h) = frame_size;
    if w == 0 || h == 0 {
        return None;
    }
    let normalize = |(x, y): (f32, f32)| (x / w as f32, y / h as f32);
    let thumb = landmarks.get(THUMB_TIP).copied().map(normalize)?;
    let index = landmarks.get(INDEX_FINGER_TIP).copied().map(normalize)?;
    Some(NormalizedTips { thumb, index })
}

/// Maps a normalized camera point to canvas pixels, clamped to the canvas.
pub fn map_to_canvas(point: (f32, f32), canvas_size: (u32, u32), flip_x: bool) -> (f32, f32) {
    let nx = if flip_x { 1.0 - point.0 } else { point.0 };
    let ny = point.1;
    let max_x = canvas_size.0.saturating_sub(1) as f32;
    let max_y = canvas_size.1.saturating_sub(1) as f32;
    (
        (nx * canvas_size.0 as f32).clamp(0.0, max_x),
        (ny * canvas_size.1 as f32).clamp(0.0, max_y),
    )
}
