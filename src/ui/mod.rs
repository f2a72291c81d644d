use std::{cell::Cell, mem, rc::Rc, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use gpui::{
    App, AppContext, Bounds, Context, IntoElement, Pixels, Render, RenderImage, TitlebarOptions,
    Window, WindowDecorations, WindowOptions,
};
use gpui_component::Root;

use crate::{
    analysis::AnalysisMessage,
    board::Board,
    config::AppConfig,
    gesture::{PinchConfig, PinchTracker},
    model_download::ModelDownloadEvent,
    pipeline::{CameraDevice, CameraStream, RecognizerBackend, start_recognizer},
    types::{Frame, Handedness, RecognizedFrame},
};

mod board_view;
mod camera_view;
mod download;
mod main_view;
mod render_util;
mod titlebar;

const CAMERA_MIN_SIZE: (f32, f32) = (200.0, 150.0);
const CAMERA_MAX_SIZE: (f32, f32) = (640.0, 480.0);
const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;
const RIGHT_PANEL_MIN_WIDTH: f32 = 260.0;
const RIGHT_PANEL_MAX_WIDTH: f32 = 640.0;
const RIGHT_PANEL_INITIAL_WIDTH: f32 = 360.0;

pub fn launch_ui(
    app: &mut App,
    config: AppConfig,
    frame_tx: Sender<Frame>,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<RecognizedFrame>,
    result_rx: Receiver<RecognizedFrame>,
    recognizer_backend: RecognizerBackend,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Gesture Board".into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| {
            AppView::new(
                config,
                frame_tx,
                frame_rx,
                result_tx,
                result_rx,
                recognizer_backend,
            )
        });
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    config: AppConfig,
    frame_tx: Sender<Frame>,
    frame_rx: Option<Receiver<Frame>>,
    result_tx: Option<Sender<RecognizedFrame>>,
    result_rx: Receiver<RecognizedFrame>,
    recognizer_backend: RecognizerBackend,
    recognizer_handle: Option<thread::JoinHandle<()>>,
    camera_stream: Option<CameraStream>,
    available_cameras: Vec<CameraDevice>,
    selected_camera_idx: Option<usize>,
    camera_error: Option<String>,
    camera_picker_open: bool,
    latest_frame_size: Option<(u32, u32)>,
    latest_hand: Option<(f32, Handedness)>,
    latest_image: Option<Arc<RenderImage>>,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
    right_panel_width: f32,
    panel_resize_state: Option<PanelResizeState>,
    board: Board,
    board_image: Option<Arc<RenderImage>>,
    board_image_revision: Option<u64>,
    board_bounds: Rc<Cell<Option<Bounds<Pixels>>>>,
    mouse_drawing: bool,
    pinch: PinchTracker,
    analysis: AnalysisState,
    analysis_tx: Sender<AnalysisMessage>,
    analysis_rx: Receiver<AnalysisMessage>,
    mouse_only: bool,
}

enum Screen {
    Camera(CameraState),
    Download(DownloadState),
    Main,
}

enum CameraState {
    Unavailable {
        message: String,
    },
    Selection {
        options: Vec<CameraDevice>,
        selected: usize,
        start_error: Option<String>,
    },
    Ready,
}

struct DownloadState {
    downloaded: u64,
    total: Option<u64>,
    current: Option<&'static str>,
    ready_models: usize,
    message: String,
    error: Option<String>,
    finished: bool,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            downloaded: 0,
            total: None,
            current: None,
            ready_models: 0,
            message: "Preparing hand tracking models...".to_string(),
            error: None,
            finished: false,
        }
    }
}

enum DownloadMessage {
    Event(ModelDownloadEvent),
    Error(String),
    AllReady,
}

/// What the response area under the board shows.
enum AnalysisState {
    Idle,
    Running,
    Answer(String),
    Failed(String),
}

impl AnalysisState {
    fn is_running(&self) -> bool {
        matches!(self, AnalysisState::Running)
    }
}

struct PanelResizeState {
    start_pointer_x: f32,
    start_width: f32,
}

impl AppView {
    fn new(
        config: AppConfig,
        frame_tx: Sender<Frame>,
        frame_rx: Receiver<Frame>,
        result_tx: Sender<RecognizedFrame>,
        result_rx: Receiver<RecognizedFrame>,
        recognizer_backend: RecognizerBackend,
    ) -> Self {
        let (download_tx, download_rx) = unbounded();
        let download_handle =
            download::spawn_model_download(recognizer_backend.clone(), download_tx);
        let (analysis_tx, analysis_rx) = unbounded();
        let (initial_camera_state, available_cameras) =
            Self::initial_camera_state(config.camera_index);
        let selected_camera_idx = match &initial_camera_state {
            CameraState::Selection { selected, .. } => Some(*selected),
            _ => None,
        };
        let pinch = PinchTracker::new(PinchConfig::from(&config));
        let board = Board::new(0, 0, config.default_stroke_width);

        Self {
            screen: Screen::Camera(initial_camera_state),
            config,
            frame_tx,
            frame_rx: Some(frame_rx),
            result_tx: Some(result_tx),
            result_rx,
            recognizer_backend,
            recognizer_handle: None,
            camera_stream: None,
            available_cameras,
            selected_camera_idx,
            camera_error: None,
            camera_picker_open: false,
            latest_frame_size: None,
            latest_hand: None,
            latest_image: None,
            download_rx,
            _download_handle: download_handle,
            right_panel_width: RIGHT_PANEL_INITIAL_WIDTH,
            panel_resize_state: None,
            board,
            board_image: None,
            board_image_revision: None,
            board_bounds: Rc::new(Cell::new(None)),
            mouse_drawing: false,
            pinch,
            analysis: AnalysisState::Idle,
            analysis_tx,
            analysis_rx,
            mouse_only: false,
        }
    }

    fn start_recognizer_if_needed(&mut self) {
        if self.recognizer_handle.is_some() {
            return;
        }

        let Some(frame_rx) = self.frame_rx.take() else {
            log::warn!("missing frame receiver for recognizer");
            return;
        };
        let Some(result_tx) = self.result_tx.take() else {
            log::warn!("missing result sender for recognizer");
            return;
        };

        let handle = start_recognizer(self.recognizer_backend.clone(), frame_rx, result_tx);
        self.recognizer_handle = Some(handle);
    }

    /// Drops the camera and goes straight to the board; drawing is by mouse only.
    fn enter_mouse_only(&mut self) {
        log::info!("continuing without gesture input");
        self.stop_camera_stream();
        self.mouse_only = true;
        self.camera_picker_open = false;
        self.screen = Screen::Main;
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::Camera(mut state) => {
                let view = self.render_camera_view(&mut state, cx);
                screen = match state {
                    CameraState::Ready => Screen::Download(DownloadState::new()),
                    state => Screen::Camera(state),
                };
                view
            }
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                let should_switch = state.finished && state.error.is_none();
                let view = self.render_download_view(&state, cx);
                if should_switch {
                    self.start_recognizer_if_needed();
                    screen = Screen::Main;
                } else {
                    screen = Screen::Download(state);
                }
                view
            }
            Screen::Main => {
                screen = Screen::Main;
                self.render_main(window, cx)
            }
        };
        self.screen = screen;
        view
    }
}
