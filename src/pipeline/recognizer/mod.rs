mod common;
mod ort;
mod palm;

use std::{path::PathBuf, thread};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    model_download::{ModelKind, default_model_path},
    types::{Frame, HandTracking, RecognizedFrame},
};

/// Below this combined palm/handpose confidence the landmarks are discarded.
const DETECTION_THRESHOLD: f32 = 0.2;

pub(crate) trait HandposeEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<HandTracking>;
}

/// Consumes frames until the camera side hangs up, always working on the
/// newest one, and hands results to the UI without ever blocking on it.
fn run_worker_loop<E: HandposeEngine>(
    mut engine: E,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<RecognizedFrame>,
) {
    while let Some(frame) = recv_latest_frame(&frame_rx) {
        match engine.infer(&frame) {
            Ok(result) => {
                let recognized = RecognizedFrame {
                    result: gate_detection(result),
                    frame,
                };
                let _ = result_tx.try_send(recognized);
            }
            Err(err) => {
                log::warn!("handpose inference failed: {err:?}");
            }
        }
    }
    log::info!("frame channel closed, recognizer stopping");
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}

fn gate_detection(mut result: HandTracking) -> HandTracking {
    if result.confidence < DETECTION_THRESHOLD {
        result.landmarks = None;
    }
    result
}

#[derive(Clone, Debug)]
pub struct RecognizerBackend {
    handpose_estimator_model_path: PathBuf,
    palm_detector_model_path: PathBuf,
}

impl RecognizerBackend {
    pub fn handpose_estimator_model_path(&self) -> PathBuf {
        self.handpose_estimator_model_path.clone()
    }

    pub fn palm_detector_model_path(&self) -> PathBuf {
        self.palm_detector_model_path.clone()
    }

    pub fn models(&self) -> [(ModelKind, PathBuf); 2] {
        [
            (ModelKind::PalmDetector, self.palm_detector_model_path()),
            (
                ModelKind::HandposeEstimator,
                self.handpose_estimator_model_path(),
            ),
        ]
    }

    pub fn label(&self) -> &'static str {
        "ort"
    }
}

impl Default for RecognizerBackend {
    fn default() -> Self {
        Self {
            handpose_estimator_model_path: default_model_path(ModelKind::HandposeEstimator),
            palm_detector_model_path: default_model_path(ModelKind::PalmDetector),
        }
    }
}

pub fn start_recognizer(
    backend: RecognizerBackend,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<RecognizedFrame>,
) -> thread::JoinHandle<()> {
    log::info!("starting handpose backend: {}", backend.label());
    ort::start_worker(backend, frame_rx, result_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Instant;

    struct FakeEngine {
        confidence: f32,
    }

    impl HandposeEngine for FakeEngine {
        fn infer(&mut self, frame: &Frame) -> anyhow::Result<HandTracking> {
            if frame.width == 0 {
                anyhow::bail!("empty frame");
            }
            Ok(HandTracking {
                landmarks: Some(vec![(frame.width as f32, 0.0); 21]),
                confidence: self.confidence,
                ..HandTracking::empty()
            })
        }
    }

    fn frame(width: u32) -> Frame {
        Frame {
            rgba: Vec::new(),
            width,
            height: 1,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn latest_frame_wins() {
        let (tx, rx) = bounded(4);
        for w in 1..=3 {
            tx.send(frame(w)).unwrap();
        }
        assert_eq!(recv_latest_frame(&rx).map(|f| f.width), Some(3));
        drop(tx);
        assert!(recv_latest_frame(&rx).is_none());
    }

    #[test]
    fn worker_forwards_results_and_stops_on_disconnect() {
        let (frame_tx, frame_rx) = bounded(4);
        let (result_tx, result_rx) = bounded(4);
        frame_tx.send(frame(7)).unwrap();
        drop(frame_tx);

        run_worker_loop(FakeEngine { confidence: 0.9 }, frame_rx, result_tx);

        let recognized = result_rx.try_recv().unwrap();
        assert_eq!(recognized.frame.width, 7);
        assert_eq!(recognized.result.landmarks.unwrap()[0], (7.0, 0.0));
    }

    #[test]
    fn inference_errors_are_skipped() {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(1);
        frame_tx.send(frame(0)).unwrap();
        drop(frame_tx);

        run_worker_loop(FakeEngine { confidence: 0.9 }, frame_rx, result_tx);
        assert!(result_rx.try_recv().is_err());
    }

    #[test]
    fn weak_detections_lose_their_landmarks() {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(1);
        frame_tx.send(frame(3)).unwrap();
        drop(frame_tx);

        run_worker_loop(FakeEngine { confidence: 0.05 }, frame_rx, result_tx);
        let recognized = result_rx.try_recv().unwrap();
        assert!(recognized.result.landmarks.is_none());
    }

    #[test]
    fn default_backend_points_into_models_dir() {
        let backend = RecognizerBackend::default();
        assert!(backend.palm_detector_model_path().starts_with("models"));
        assert!(backend.handpose_estimator_model_path().starts_with("models"));
    }
}
