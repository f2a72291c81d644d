use std::{path::Path, thread};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine, RecognizerBackend,
    common::{self, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, pick_primary_region},
    run_worker_loop,
};
use crate::{
    model_download::{ModelKind, ensure_model_ready},
    types::{Frame, HandTracking, Handedness, RecognizedFrame},
};

pub fn start_worker(
    backend: RecognizerBackend,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<RecognizedFrame>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let handpose_path = backend.handpose_estimator_model_path();
        let palm_path = backend.palm_detector_model_path();

        for (kind, path) in [
            (ModelKind::HandposeEstimator, &handpose_path),
            (ModelKind::PalmDetector, &palm_path),
        ] {
            if let Err(err) = ensure_model_ready(kind, path, |_evt| {}) {
                log::error!(
                    "failed to prepare {} model at {}: {err:?}",
                    kind.label(),
                    path.display()
                );
                return;
            }
        }

        let engine = match OrtEngine::new(&handpose_path, &palm_path) {
            Ok(engine) => {
                log::info!(
                    "handpose ORT backend ready using {} and palm detector {}",
                    handpose_path.display(),
                    palm_path.display()
                );
                engine
            }
            Err(err) => {
                log::error!("failed to load ORT handpose model: {err:?}");
                return;
            }
        };

        run_worker_loop(engine, frame_rx, result_tx);
    })
}

struct OrtEngine {
    handpose: Session,
    palm_detector: PalmDetector,
}

impl OrtEngine {
    fn new(handpose_path: &Path, palm_detector_path: &Path) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_path)
            .with_context(|| {
                format!(
                    "failed to load ORT session from {}",
                    handpose_path.display()
                )
            })?;
        let palm_detector = PalmDetector::new(palm_detector_path, PalmDetectorConfig::default())?;

        Ok(Self {
            handpose,
            palm_detector,
        })
    }
}

impl HandposeEngine for OrtEngine {
    fn infer(&mut self, frame: &Frame) -> Result<HandTracking> {
        let palm_regions = self.palm_detector.detect(frame).unwrap_or_else(|err| {
            log::warn!("palm detection failed: {err:?}");
            Vec::new()
        });

        let Some(palm) = pick_primary_region(&palm_regions) else {
            return Ok(HandTracking {
                palm_regions,
                ..HandTracking::empty()
            });
        };
        let palm_score = palm.score;
        let (center, side, angle) = crop_from_palm(palm);

        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;
        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flat)?;

        // Outputs after the coordinates: hand presence, then right-hand probability.
        let scalar_output = |idx: usize| {
            if idx >= outputs.len() {
                return 0.0;
            }
            outputs[idx]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        };
        let presence = scalar_output(1);
        let handedness = scalar_output(2);

        Ok(HandTracking {
            landmarks: Some(transform.project_landmarks(&landmarks)),
            confidence: (presence * palm_score).clamp(0.0, 1.0),
            handedness: Handedness::from_score(handedness),
            palm_regions,
        })
    }
}
