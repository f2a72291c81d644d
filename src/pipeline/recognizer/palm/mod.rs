mod anchors;

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anchors::{NUM_ANCHORS, generate_anchors};
use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::types::{Frame, PalmRegion};

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, letterbox_frame};

const PALM_LANDMARKS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_LANDMARKS * 2;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 4,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(),
            cfg,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let boxes = boxes
            .as_slice()
            .ok_or_else(|| anyhow!("palm boxes not contiguous"))?;
        let scores = scores
            .as_slice()
            .ok_or_else(|| anyhow!("palm scores not contiguous"))?;

        decode_palms(boxes, scores, &self.anchors, &letterbox, &self.cfg)
    }
}

/// Decodes raw regressor output (`[anchors, 18]`) and logits (`[anchors]`)
/// into frame-space palms, strongest first.
fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    if scores.is_empty() || boxes.len() % scores.len() != 0 {
        return Err(anyhow!(
            "palm outputs disagree: {} box values for {} scores",
            boxes.len(),
            scores.len()
        ));
    }
    let features = boxes.len() / scores.len();
    if features < BOX_FEATURES {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }

    let input = PALM_INPUT_SIZE as f32;
    let side = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let (bias_x, bias_y) = (
        letterbox.pad_x / letterbox.scale,
        letterbox.pad_y / letterbox.scale,
    );
    let to_frame = |nx: f32, ny: f32| (nx * side - bias_x, ny * side - bias_y);

    let mut candidates = Vec::new();
    for (idx, (raw, anchor)) in scores
        .iter()
        .zip(anchors)
        .take(NUM_ANCHORS.min(anchors.len()))
        .enumerate()
    {
        let score = sigmoid(*raw);
        if score < cfg.score_threshold {
            continue;
        }
        let f = &boxes[idx * features..idx * features + BOX_FEATURES];
        let (cx, cy) = (f[0] / input + anchor[0], f[1] / input + anchor[1]);
        let (hw, hh) = (f[2] / input / 2.0, f[3] / input / 2.0);
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        let bbox = clamp_box([x1, y1, x2, y2], letterbox.orig_w, letterbox.orig_h);

        let landmarks = f[4..BOX_FEATURES]
            .chunks_exact(2)
            .map(|p| to_frame(p[0] / input + anchor[0], p[1] / input + anchor[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    Ok(nms(candidates, cfg.nms_threshold, cfg.top_k))
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Centre, side length and rotation of the square crop fed to the handpose model.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let [x1, y1, x2, y2] = region.bbox;
    let center = match mean(&region.landmarks) {
        Some(m) => m,
        None => ((x1 + x2) * 0.5, (y1 + y2) * 0.5),
    };

    let landmark_span = region
        .landmarks
        .iter()
        .fold(None, |acc: Option<[f32; 4]>, &(x, y)| {
            Some(match acc {
                None => [x, x, y, y],
                Some([lx, hx, ly, hy]) => [lx.min(x), hx.max(x), ly.min(y), hy.max(y)],
            })
        })
        .map(|[lx, hx, ly, hy]| (hx - lx).max(hy - ly))
        .unwrap_or(0.0);

    // Expand generously to avoid cropping fingers away.
    let side = (x2 - x1)
        .abs()
        .max((y2 - y1).abs())
        .max(landmark_span)
        .max(80.0)
        * 2.4;

    (center, side, estimate_orientation(region))
}

/// Principal axis of the palm landmarks, rotated so the fingers point up.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    if region.landmarks.len() < 2 {
        return 0.0;
    }
    let Some((mx, my)) = mean(&region.landmarks) else {
        return 0.0;
    };

    let n = region.landmarks.len() as f32;
    let (sxx, sxy, syy) = region
        .landmarks
        .iter()
        .fold((0.0, 0.0, 0.0), |(sxx, sxy, syy), &(x, y)| {
            let (dx, dy) = (x - mx, y - my);
            (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
        });
    let (cov_xx, cov_xy, cov_yy) = (sxx / n, sxy / n, syy / n);

    let half_trace = (cov_xx + cov_yy) * 0.5;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda = (half_trace + (half_trace * half_trace - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn mean(points: &[(f32, f32)]) -> Option<(f32, f32)> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
    let n = points.len() as f32;
    Some((sx / n, sy / n))
}

fn nms(mut candidates: Vec<PalmRegion>, threshold: f32, top_k: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if keep.len() >= top_k {
            break;
        }
        if keep.iter().all(|k| iou(&k.bbox, &candidate.bbox) < threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: [f32; 4], w: u32, h: u32) -> [f32; 4] {
    let max_w = w.saturating_sub(1) as f32;
    let max_h = h.saturating_sub(1) as f32;
    [
        bbox[0].clamp(0.0, max_w),
        bbox[1].clamp(0.0, max_h),
        bbox[2].clamp(0.0, max_w),
        bbox[3].clamp(0.0, max_h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bbox: [f32; 4], score: f32) -> PalmRegion {
        PalmRegion {
            bbox,
            landmarks: Vec::new(),
            score,
        }
    }

    fn square_letterbox() -> LetterboxInfo {
        LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: PALM_INPUT_SIZE,
            orig_h: PALM_INPUT_SIZE,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_weaker_boxes() {
        let kept = nms(
            vec![
                region([0.0, 0.0, 10.0, 10.0], 0.6),
                region([1.0, 1.0, 11.0, 11.0], 0.9),
                region([50.0, 50.0, 60.0, 60.0], 0.7),
            ],
            0.3,
            8,
        );
        let scores: Vec<f32> = kept.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn nms_respects_top_k() {
        let kept = nms(
            vec![
                region([0.0, 0.0, 1.0, 1.0], 0.9),
                region([5.0, 5.0, 6.0, 6.0], 0.8),
            ],
            0.3,
            1,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn primary_region_is_highest_score() {
        let regions = vec![region([0.0; 4], 0.4), region([0.0; 4], 0.8)];
        assert_eq!(pick_primary_region(&regions).map(|r| r.score), Some(0.8));
        assert!(pick_primary_region(&[]).is_none());
    }

    #[test]
    fn decode_keeps_confident_anchor_in_frame_space() {
        let anchors = vec![[0.5, 0.5], [0.25, 0.25]];
        let mut boxes = vec![0.0; 2 * BOX_FEATURES];
        // Anchor 0: 48px square centred on the anchor.
        boxes[2] = 48.0;
        boxes[3] = 48.0;
        let scores = vec![5.0, -5.0];

        let palms = decode_palms(
            &boxes,
            &scores,
            &anchors,
            &square_letterbox(),
            &PalmDetectorConfig::default(),
        )
        .unwrap();
        assert_eq!(palms.len(), 1);
        assert_eq!(palms[0].bbox, [72.0, 72.0, 120.0, 120.0]);
        assert_eq!(palms[0].landmarks.len(), PALM_LANDMARKS);
        assert_eq!(palms[0].landmarks[0], (96.0, 96.0));
    }

    #[test]
    fn decode_rejects_mismatched_outputs() {
        let result = decode_palms(
            &[0.0; 10],
            &[0.0; 3],
            &[[0.5, 0.5]; 3],
            &square_letterbox(),
            &PalmDetectorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn crop_centres_on_landmarks_and_expands() {
        let palm = PalmRegion {
            bbox: [0.0, 0.0, 100.0, 50.0],
            landmarks: vec![(40.0, 20.0), (60.0, 20.0)],
            score: 0.9,
        };
        let (center, side, _) = crop_from_palm(&palm);
        assert_eq!(center, (50.0, 20.0));
        assert!((side - 240.0).abs() < 1e-3);
    }

    #[test]
    fn horizontal_palm_axis_rotates_a_quarter_turn() {
        let palm = PalmRegion {
            bbox: [0.0; 4],
            landmarks: vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)],
            score: 1.0,
        };
        assert!((estimate_orientation(&palm) + PI * 0.5).abs() < 1e-5);
    }
}
