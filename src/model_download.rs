use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const MODEL_DIR: &str = "models";
const MODEL_BASE_URL: &str =
    "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    HandposeEstimator,
    PalmDetector,
}

impl ModelKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose_estimation_mediapipe_2023feb.onnx",
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose estimator",
            ModelKind::PalmDetector => "palm detector",
        }
    }

    fn url(&self) -> String {
        format!("{MODEL_BASE_URL}/{}", self.file_name())
    }
}

pub fn default_model_path(kind: ModelKind) -> PathBuf {
    PathBuf::from(MODEL_DIR).join(kind.file_name())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure `model_path` exists, downloading the model if needed. Progress is
/// reported through `on_event` and mirrored on a console progress bar.
pub fn ensure_model_ready<F>(model: ModelKind, model_path: &Path, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(model, &model.url(), model_path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { model } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| {
        format!(
            "failed to download {} model to {}",
            model.label(),
            model_path.display()
        )
    })
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { model, total });

    stream_to_file(model, &mut response, total, dest, on_event)?;
    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

/// Copies `reader` into a sibling temp file and moves it over `dest`. The temp
/// file is removed again when any step fails.
fn stream_to_file<R, F>(
    model: ModelKind,
    reader: &mut R,
    total: Option<u64>,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let tmp_path = dest.with_extension("download");
    let result = write_then_rename(model, reader, total, &tmp_path, dest, on_event);
    if result.is_err() && tmp_path.exists() {
        if let Err(err) = fs::remove_file(&tmp_path) {
            log::warn!("failed to remove {}: {err}", tmp_path.display());
        }
    }
    result
}

fn write_then_rename<R, F>(
    model: ModelKind,
    reader: &mut R,
    total: Option<u64>,
    tmp_path: &Path,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(ModelDownloadEvent),
{
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("failed while writing model to disk")?;
        downloaded += read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    drop(file);
    fs::rename(tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_live_under_models() {
        let path = default_model_path(ModelKind::PalmDetector);
        assert_eq!(
            path,
            PathBuf::from("models").join("palm_detection_mediapipe_2023feb.onnx")
        );
    }

    #[test]
    fn urls_point_at_the_model_file() {
        assert!(
            ModelKind::HandposeEstimator
                .url()
                .ends_with("/handpose_estimation_mediapipe_2023feb.onnx")
        );
    }

    #[test]
    fn present_model_reports_without_downloading() {
        let dir = std::env::temp_dir().join(format!("gesture-board-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(ModelKind::PalmDetector.file_name());
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(ModelKind::PalmDetector, &path, |evt| events.push(evt)).unwrap();
        assert_eq!(
            events,
            vec![
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::PalmDetector
                },
                ModelDownloadEvent::Finished {
                    model: ModelKind::PalmDetector
                },
            ]
        );

        let _ = fs::remove_dir_all(&dir);
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenReader {
        sent: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"onnx");
            Ok(4)
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gesture-board-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn failed_download_leaves_no_temp_file() {
        let dir = scratch_dir("broken-download");
        let dest = dir.join(ModelKind::HandposeEstimator.file_name());

        let mut events = Vec::new();
        let result = stream_to_file(
            ModelKind::HandposeEstimator,
            &mut BrokenReader { sent: false },
            Some(100),
            &dest,
            &mut |evt| events.push(evt),
        );

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("download").exists());
        assert_eq!(
            events,
            vec![ModelDownloadEvent::Progress {
                model: ModelKind::HandposeEstimator,
                downloaded: 4,
                total: Some(100),
            }]
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn finished_download_is_moved_into_place() {
        let dir = scratch_dir("good-download");
        let dest = dir.join(ModelKind::PalmDetector.file_name());

        let mut body = std::io::Cursor::new(b"palm-model-bytes".to_vec());
        stream_to_file(ModelKind::PalmDetector, &mut body, None, &dest, &mut |_| {}).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"palm-model-bytes");
        assert!(!dest.with_extension("download").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
