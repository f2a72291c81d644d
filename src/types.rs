use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

/// Hand landmarks for one frame, in frame pixel coordinates.
#[derive(Clone, Debug)]
pub struct HandTracking {
    pub landmarks: Option<Vec<(f32, f32)>>,
    pub confidence: f32,
    pub handedness: Handedness,
    pub palm_regions: Vec<PalmRegion>,
}

impl HandTracking {
    pub fn empty() -> Self {
        Self {
            landmarks: None,
            confidence: 0.0,
            handedness: Handedness::Unknown,
            palm_regions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecognizedFrame {
    pub frame: Frame,
    pub result: HandTracking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else if score > 0.0 {
            Handedness::Left
        } else {
            Handedness::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left hand",
            Handedness::Right => "right hand",
            Handedness::Unknown => "hand",
        }
    }
}
