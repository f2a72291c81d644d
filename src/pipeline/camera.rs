use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Buffer, Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::rgba_converter;
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

/// Handle to the capture thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// While paused, frames are still pulled from the device but not forwarded.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

pub fn start_camera_stream(
    index: CameraIndex,
    mirror: bool,
    frame_tx: Sender<Frame>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    drop(build_camera(index.clone())?);

    let stop = Arc::new(AtomicBool::new(false));
    let paused = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let paused_flag = paused.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to open camera: {err:?}");
                return;
            }
        };
        log::info!("camera stream started ({})", camera.info().human_name());

        while !stop_flag.load(Ordering::Relaxed) {
            let frame_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        frame_start.elapsed()
                    );
                    continue;
                }
            };

            if let Err(err) = forward_frame(&buffer, mirror, &paused_flag, &frame_tx) {
                log::warn!("failed to decode camera frame {err:?}");
            }
        }

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    });

    Ok(CameraStream {
        stop,
        paused,
        handle: Some(handle),
    })
}

/// Decodes one captured buffer and offers it to the recognizer. Returns
/// whether the frame was queued; paused streams and a busy recognizer drop it.
fn forward_frame(
    buffer: &Buffer,
    mirror: bool,
    paused: &AtomicBool,
    frame_tx: &Sender<Frame>,
) -> Result<bool> {
    if paused.load(Ordering::Relaxed) {
        return Ok(false);
    }

    let mut converted = rgba_converter::convert_camera_frame(buffer)?;
    if mirror {
        rgba_converter::mirror_horizontally(&mut converted.rgba, converted.width, converted.height);
    }

    let frame = Frame {
        rgba: converted.rgba,
        width: converted.width,
        height: converted.height,
        timestamp: Instant::now(),
    };

    // The recognizer only ever wants the newest frame.
    Ok(frame_tx.try_send(frame).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use nokhwa::utils::Resolution;

    fn rgb_buffer(pixels: &[u8], width: u32) -> Buffer {
        let height = (pixels.len() / 3) as u32 / width;
        Buffer::new(Resolution::new(width, height), pixels, FrameFormat::RAWRGB)
    }

    #[test]
    fn paused_stream_forwards_nothing() {
        let (tx, rx) = bounded(1);
        let paused = AtomicBool::new(true);
        let queued = forward_frame(&rgb_buffer(&[1, 2, 3], 1), false, &paused, &tx).unwrap();
        assert!(!queued);
        assert!(rx.try_recv().is_err());

        paused.store(false, Ordering::SeqCst);
        assert!(forward_frame(&rgb_buffer(&[1, 2, 3], 1), false, &paused, &tx).unwrap());
        assert_eq!(rx.try_recv().unwrap().rgba, vec![1, 2, 3, 255]);
    }

    #[test]
    fn busy_recognizer_keeps_the_queued_frame() {
        let (tx, rx) = bounded(1);
        let paused = AtomicBool::new(false);
        assert!(forward_frame(&rgb_buffer(&[10, 10, 10], 1), false, &paused, &tx).unwrap());
        // The channel is full; this call must return instead of blocking.
        assert!(!forward_frame(&rgb_buffer(&[20, 20, 20], 1), false, &paused, &tx).unwrap());

        assert_eq!(rx.try_recv().unwrap().rgba, vec![10, 10, 10, 255]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mirrored_frames_arrive_flipped() {
        let (tx, rx) = bounded(1);
        let paused = AtomicBool::new(false);
        let buffer = rgb_buffer(&[1, 1, 1, 2, 2, 2], 2);
        assert!(forward_frame(&buffer, true, &paused, &tx).unwrap());

        let frame = rx.try_recv().unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.rgba, vec![2, 2, 2, 255, 1, 1, 1, 255]);
    }

    #[test]
    fn undecodable_buffers_are_errors() {
        let (tx, rx) = bounded(1);
        let paused = AtomicBool::new(false);
        let short = Buffer::new(Resolution::new(4, 4), &[0; 5], FrameFormat::RAWRGB);
        assert!(forward_frame(&short, false, &paused, &tx).is_err());
        assert!(rx.try_recv().is_err());
    }
}
