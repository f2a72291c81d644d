use gpui::{
    AnyElement, Context, InteractiveElement, IntoElement, MouseButton, ParentElement,
    SharedString, Styled, div, prelude::FluentBuilder, px,
};
use gpui_component::{
    ActiveTheme, StyledExt,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use super::{AppView, CameraState, DownloadState, Screen};
use crate::pipeline::{CameraDevice, available_cameras, start_camera_stream};

/// Which list the picker belongs to: the startup screen or the overlay on the
/// main screen. Clicking a row means "select" in the first and "switch" in the
/// second.
#[derive(Clone, Copy)]
enum PickerMode {
    Startup,
    Switch,
}

impl AppView {
    fn render_camera_picker(
        &mut self,
        mode: PickerMode,
        cameras: &[CameraDevice],
        selected_idx: Option<usize>,
        error_msg: Option<&str>,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let mut title_row = h_flex()
            .justify_between()
            .items_center()
            .w_full()
            .mb_2()
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(div().text_base().text_color(gpui::rgb(0xa5b4fc)).child("◉"))
                    .child(
                        div()
                            .text_sm()
                            .font_semibold()
                            .text_color(gpui::rgb(0xe2e8f0))
                            .child("Choose a camera"),
                    ),
            );
        if let PickerMode::Switch = mode {
            title_row = title_row.child(
                Button::new(SharedString::from("camera-picker-close"))
                    .label("×")
                    .ghost()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.camera_picker_open = false;
                        cx.notify();
                    })),
            );
        }

        let mut picker = v_flex()
            .gap_2()
            .p_4()
            .rounded_xl()
            .bg(gpui::rgba(0x0f1419f5))
            .border_1()
            .border_color(gpui::rgba(0x2d3748ff))
            .shadow_lg()
            .child(title_row);

        for (idx, device) in cameras.iter().enumerate() {
            let is_selected = selected_idx == Some(idx);
            picker = picker.child(
                h_flex()
                    .w_full()
                    .gap_3()
                    .items_center()
                    .p_3()
                    .rounded_lg()
                    .cursor_pointer()
                    .bg(if is_selected {
                        gpui::rgba(0x2d374855)
                    } else {
                        gpui::rgba(0x1e293b00)
                    })
                    .border_1()
                    .border_color(if is_selected {
                        gpui::rgba(0x64748bff)
                    } else {
                        gpui::rgba(0x33415500)
                    })
                    .hover(|this| this.bg(gpui::rgba(0x2d374844)))
                    .on_mouse_down(
                        MouseButton::Left,
                        cx.listener(move |this, _, _, cx| {
                            match mode {
                                PickerMode::Startup => this.select_camera(idx),
                                PickerMode::Switch => this.switch_camera(idx),
                            }
                            cx.notify();
                        }),
                    )
                    .child(
                        div()
                            .flex_1()
                            .text_sm()
                            .text_color(if is_selected {
                                gpui::rgb(0xe2e8f0)
                            } else {
                                gpui::rgb(0xcbd5e1)
                            })
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(device.label.clone()),
                    )
                    .when(is_selected, |this| {
                        this.child(div().text_sm().text_color(gpui::rgb(0xa5b4fc)).child("✓"))
                    }),
            );
        }

        if let Some(err) = error_msg {
            picker = picker.child(
                div()
                    .mt_2()
                    .p_3()
                    .rounded_lg()
                    .bg(gpui::rgba(0x7f1d1d33))
                    .border_1()
                    .border_color(gpui::rgba(0xef4444aa))
                    .text_xs()
                    .text_color(gpui::rgb(0xfca5a5))
                    .child(format!("! {err}")),
            );
        }

        if let PickerMode::Startup = mode {
            picker = picker
                .child(
                    Button::new(SharedString::from("camera-confirm"))
                        .primary()
                        .label("✓ Use this camera")
                        .w_full()
                        .mt_2()
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.start_selected_camera();
                            cx.notify();
                        })),
                )
                .child(
                    Button::new(SharedString::from("camera-skip"))
                        .ghost()
                        .label("Draw with the mouse only")
                        .w_full()
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.enter_mouse_only();
                            cx.notify();
                        })),
                );
        }

        picker.into_any_element()
    }

    pub(super) fn render_camera_picker_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let cameras = self.available_cameras.clone();
        let error = self.camera_error.clone();
        self.render_camera_picker(
            PickerMode::Switch,
            &cameras,
            self.selected_camera_idx,
            error.as_deref(),
            cx,
        )
    }

    /// Enumerates cameras; `preferred` is the index remembered in the config.
    pub(super) fn initial_camera_state(preferred: Option<usize>) -> (CameraState, Vec<CameraDevice>) {
        match available_cameras() {
            Ok(cameras) if cameras.is_empty() => (
                CameraState::Unavailable {
                    message: "No camera was found.".to_string(),
                },
                Vec::new(),
            ),
            Ok(cameras) => {
                let selected = preferred.filter(|idx| *idx < cameras.len()).unwrap_or(0);
                (
                    CameraState::Selection {
                        options: cameras.clone(),
                        selected,
                        start_error: None,
                    },
                    cameras,
                )
            }
            Err(err) => {
                log::error!("failed to enumerate cameras: {err:?}");
                (
                    CameraState::Unavailable {
                        message: format!("Cameras could not be listed: {err:#}"),
                    },
                    Vec::new(),
                )
            }
        }
    }

    pub(super) fn render_camera_view(
        &mut self,
        state: &mut CameraState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        match state {
            CameraState::Unavailable { message } => {
                let continue_button = Button::new(SharedString::from("mouse-only"))
                    .primary()
                    .label("Continue with the mouse")
                    .mt_2()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.enter_mouse_only();
                        cx.notify();
                    }));
                let theme = cx.theme();
                let card = v_flex()
                    .gap_2()
                    .p_4()
                    .w(px(420.0))
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.group_box)
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.accent)
                            .font_semibold()
                            .child("⚠ No camera available"),
                    )
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child("Check the camera connection and permissions, or draw with the mouse."),
                    )
                    .child(div().text_color(theme.foreground).child(message.clone()));

                v_flex()
                    .size_full()
                    .items_center()
                    .justify_center()
                    .bg(theme.background)
                    .child(card.child(continue_button))
                    .into_any_element()
            }
            CameraState::Selection {
                options,
                selected,
                start_error,
            } => {
                // A single camera needs no picker; start it right away.
                if options.len() == 1 && self.camera_stream.is_none() && start_error.is_none() {
                    match self.start_camera_for_device(0, &options[0]) {
                        Ok(()) => {
                            *state = CameraState::Ready;
                            return div().child("Starting camera...").into_any_element();
                        }
                        Err(err) => {
                            *start_error = Some(format!("Could not start the camera: {err}"));
                        }
                    }
                }

                let options = options.clone();
                let selected = Some(*selected);
                let error_msg = start_error.clone();
                let picker = self.render_camera_picker(
                    PickerMode::Startup,
                    &options,
                    selected,
                    error_msg.as_deref(),
                    cx,
                );

                div()
                    .size_full()
                    .flex()
                    .items_center()
                    .justify_center()
                    .bg(gpui::rgba(0x1a233288))
                    .child(div().w(px(450.0)).child(picker))
                    .into_any_element()
            }
            CameraState::Ready => {
                let theme = cx.theme();
                v_flex()
                    .gap_2()
                    .p_4()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.group_box)
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.foreground)
                            .child("⟳ Starting camera..."),
                    )
                    .into_any_element()
            }
        }
    }

    pub(super) fn switch_camera(&mut self, idx: usize) {
        let Some(device) = self.available_cameras.get(idx).cloned() else {
            self.camera_error = Some("The selected camera is gone".to_string());
            return;
        };
        if let Err(err) = self.start_camera_for_device(idx, &device) {
            self.camera_error = Some(format!("Could not start the camera: {err}"));
        }
    }

    fn select_camera(&mut self, selected: usize) {
        if let Screen::Camera(CameraState::Selection {
            options,
            selected: current,
            start_error,
        }) = &mut self.screen
        {
            if selected < options.len() {
                *current = selected;
                *start_error = None;
                self.selected_camera_idx = Some(selected);
            }
        }
    }

    pub(super) fn stop_camera_stream(&mut self) {
        if let Some(stream) = self.camera_stream.take() {
            stream.stop();
        }
        if let Some(event) = self.pinch.release() {
            self.apply_pen_event(event);
        }
        self.latest_frame_size = None;
        self.latest_hand = None;
        self.latest_image = None;
    }

    /// Starts capturing from `device` and remembers it as the preferred camera.
    fn start_camera_for_device(&mut self, idx: usize, device: &CameraDevice) -> Result<(), String> {
        self.stop_camera_stream();

        let stream = start_camera_stream(
            device.index.clone(),
            self.config.mirror_camera,
            self.frame_tx.clone(),
        )
        .map_err(|err| format!("{err:#}"))?;

        if self.analysis.is_running() {
            stream.set_paused(true);
        }
        self.camera_stream = Some(stream);
        self.selected_camera_idx = Some(idx);
        self.camera_error = None;

        if self.config.camera_index != Some(idx) {
            self.config.camera_index = Some(idx);
            if let Err(err) = self.config.save() {
                log::warn!("failed to remember camera choice: {err:?}");
            }
        }
        Ok(())
    }

    fn start_selected_camera(&mut self) {
        let selected_device = match &self.screen {
            Screen::Camera(CameraState::Selection {
                options, selected, ..
            }) => {
                self.available_cameras = options.clone();
                options.get(*selected).cloned().map(|device| (*selected, device))
            }
            _ => None,
        };

        let Some((selected_idx, device)) = selected_device else {
            if let Screen::Camera(CameraState::Selection { start_error, .. }) = &mut self.screen {
                *start_error = Some("The selected camera is gone".to_string());
            }
            return;
        };

        match self.start_camera_for_device(selected_idx, &device) {
            Ok(()) => {
                self.camera_picker_open = false;
                self.screen = Screen::Download(DownloadState::new());
            }
            Err(err) => {
                if let Screen::Camera(CameraState::Selection { start_error, .. }) = &mut self.screen
                {
                    *start_error = Some(format!("Could not start the camera: {err}"));
                }
            }
        }
    }
}
