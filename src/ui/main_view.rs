use std::sync::Arc;

use gpui::{
    AnyElement, Context, InteractiveElement, IntoElement, MouseButton, MouseDownEvent,
    MouseMoveEvent, MouseUpEvent, ObjectFit, ParentElement, RenderImage, SharedString, Styled,
    StyledImage, Window, div, img, prelude::FluentBuilder, px,
};
use gpui_component::{
    ActiveTheme,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use super::{
    AppView, CAMERA_MAX_SIZE, CAMERA_MIN_SIZE, DEFAULT_CAMERA_RATIO, PanelResizeState,
    RIGHT_PANEL_MAX_WIDTH, RIGHT_PANEL_MIN_WIDTH, render_util::preview_image,
};

impl AppView {
    /// Feeds every recognized frame through the pinch tracker and keeps the
    /// newest one as the preview.
    fn drain_recognized_frames(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let mut latest = None;
        while let Ok(recognized) = self.result_rx.try_recv() {
            let frame_size = (recognized.frame.width, recognized.frame.height);
            let canvas_size = (self.board.width(), self.board.height());
            if let Some(event) = self.pinch.update(&recognized.result, frame_size, canvas_size) {
                self.apply_pen_event(event);
            }
            latest = Some(recognized);
        }

        let Some(recognized) = latest else {
            return;
        };
        self.latest_frame_size = Some((recognized.frame.width, recognized.frame.height));
        self.latest_hand = Some((recognized.result.confidence, recognized.result.handedness));
        if let Some(image) = preview_image(&recognized, self.pinch.is_drawing()) {
            self.replace_latest_image(image, window, cx);
        }
    }

    pub(super) fn render_main(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> AnyElement {
        self.poll_analysis();
        if !self.mouse_only {
            self.drain_recognized_frames(window, cx);
        }

        let toolbar = self.render_toolbar(cx);
        let board = self.render_board(window, cx);
        let response = self.render_response(cx);

        let right_panel = if self.mouse_only {
            self.render_mouse_only_panel(cx)
        } else {
            self.render_camera_panel(cx)
        };

        let theme = cx.theme();
        let (camera_icon, camera_text, camera_color) = if self.mouse_only {
            ("○", "Mouse only".to_string(), theme.muted_foreground)
        } else if self.camera_stream.as_ref().is_some_and(|s| s.is_paused()) {
            ("‖", "Camera paused".to_string(), theme.muted_foreground)
        } else if self.latest_frame_size.is_some() {
            ("●", "Camera live".to_string(), theme.success)
        } else {
            ("○", "Waiting for camera".to_string(), theme.muted_foreground)
        };
        let (recognizer_icon, recognizer_text, recognizer_color) =
            match (&self.recognizer_handle, self.board.is_drawing()) {
                (Some(_), true) => ("●", "Pen down".to_string(), theme.success),
                (Some(_), false) => ("●", "Tracking hands".to_string(), theme.success),
                (None, _) => ("○", "Gestures off".to_string(), theme.muted_foreground),
            };

        let titlebar = self.render_titlebar(
            [
                (recognizer_color, recognizer_icon, recognizer_text),
                (camera_color, camera_icon, camera_text),
            ],
            window,
            cx,
        );

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .when(self.panel_resize_state.is_some(), |this| this.cursor_ew_resize())
            .on_mouse_move(cx.listener(Self::update_panel_resize))
            .on_mouse_up(MouseButton::Left, cx.listener(Self::finish_panel_resize))
            .child(titlebar)
            .child(
                h_flex()
                    .flex_1()
                    .gap_3()
                    .p_4()
                    .items_start()
                    .child(
                        v_flex()
                            .flex_1()
                            .h_full()
                            .gap_3()
                            .child(toolbar)
                            .child(board)
                            .child(response),
                    )
                    .child(right_panel),
            )
            .into_any_element()
    }

    fn render_camera_panel(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let camera_label = self
            .selected_camera_idx
            .and_then(|idx| self.available_cameras.get(idx))
            .map(|c| c.label.clone())
            .unwrap_or_else(|| "no camera selected".to_string());

        let frame_status = match self.latest_frame_size {
            Some((w, h)) => format!("{camera_label} · {w}x{h}"),
            None => format!("{camera_label} · waiting for frames..."),
        };
        let confidence_text = match self.latest_hand {
            Some((confidence, handedness)) if confidence > 0.0 => {
                format!("{:.0}% · {}", confidence * 100.0, handedness.label())
            }
            _ => "--".to_string(),
        };

        let ratio = self.camera_aspect_ratio();
        let panel_width = self
            .right_panel_width
            .clamp(RIGHT_PANEL_MIN_WIDTH, RIGHT_PANEL_MAX_WIDTH);
        self.right_panel_width = panel_width;
        let camera_height = (panel_width / ratio).clamp(CAMERA_MIN_SIZE.1, CAMERA_MAX_SIZE.1);

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .rounded_t_lg()
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element()
        };

        let mut info_row = h_flex().justify_between().items_center().gap_2().child(
            div()
                .text_xs()
                .text_color(gpui::rgb(0xa0aab8))
                .child(format!("hand confidence: {confidence_text}")),
        );
        if self.available_cameras.len() > 1 {
            info_row = info_row.child(
                Button::new(SharedString::from("camera-picker-toggle"))
                    .outline()
                    .label(if self.camera_picker_open {
                        "◉ Close"
                    } else {
                        "◉ Switch"
                    })
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.camera_picker_open = !this.camera_picker_open;
                        cx.notify();
                    })),
            );
        }

        let picker_panel = if self.camera_picker_open && !self.available_cameras.is_empty() {
            Some(self.render_camera_picker_main(cx))
        } else {
            self.camera_error.clone().map(|err| {
                div()
                    .p_3()
                    .rounded_lg()
                    .bg(gpui::rgba(0xef444433))
                    .border_1()
                    .border_color(gpui::rgba(0xef4444ff))
                    .text_xs()
                    .text_color(gpui::rgb(0xfca5a5))
                    .child(format!("⚠ {err}"))
                    .into_any_element()
            })
        };

        let camera_card = div()
            .relative()
            .w(px(panel_width))
            .child(
                v_flex()
                    .w_full()
                    .rounded_lg()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x0f1419))
                    .child(
                        div()
                            .w(px(panel_width))
                            .h(px(camera_height))
                            .overflow_hidden()
                            .bg(gpui::rgb(0x000000))
                            .child(frame_view),
                    )
                    .child(
                        v_flex().gap_2().p_3().child(info_row).child(
                            div()
                                .text_xs()
                                .text_color(gpui::rgb(0x8b95a5))
                                .overflow_hidden()
                                .text_ellipsis()
                                .whitespace_nowrap()
                                .child(frame_status),
                        ),
                    ),
            )
            .when_some(picker_panel, |this, picker| {
                let picker_width = (panel_width * 0.9).min(400.0);
                this.child(
                    div()
                        .absolute()
                        .top(px(16.0))
                        .left(px((panel_width - picker_width) / 2.0))
                        .w(px(picker_width))
                        .child(picker),
                )
            });

        let hint = div()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .text_xs()
            .text_color(gpui::rgb(0x8b95a5))
            .child("Pinch thumb and index finger to draw; open the pinch to lift the pen.");

        let panel_handle = div()
            .absolute()
            .left(px(-6.0))
            .top(px(0.0))
            .bottom(px(0.0))
            .w(px(12.0))
            .cursor_ew_resize()
            .on_mouse_down(MouseButton::Left, cx.listener(Self::start_panel_resize))
            .on_mouse_move(cx.listener(Self::update_panel_resize))
            .on_mouse_up(MouseButton::Left, cx.listener(Self::finish_panel_resize))
            .on_mouse_up_out(MouseButton::Left, cx.listener(Self::finish_panel_resize));

        div()
            .relative()
            .w(px(panel_width))
            .h_full()
            .child(v_flex().gap_3().child(camera_card).child(hint))
            .child(panel_handle)
            .into_any_element()
    }

    fn render_mouse_only_panel(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        v_flex()
            .w(px(RIGHT_PANEL_MIN_WIDTH))
            .gap_2()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .text_sm()
                    .text_color(theme.foreground)
                    .child("Mouse mode"),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(theme.muted_foreground)
                    .child("Hand tracking is off. Hold the left button on the board to draw."),
            )
            .into_any_element()
    }

    fn camera_aspect_ratio(&self) -> f32 {
        match self.latest_frame_size {
            Some((w, h)) if h > 0 => w as f32 / h as f32,
            _ => DEFAULT_CAMERA_RATIO,
        }
    }

    fn start_panel_resize(
        &mut self,
        event: &MouseDownEvent,
        _: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        self.panel_resize_state = Some(PanelResizeState {
            start_pointer_x: f32::from(event.position.x),
            start_width: self.right_panel_width,
        });
        cx.notify();
    }

    fn update_panel_resize(
        &mut self,
        event: &MouseMoveEvent,
        _: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        let Some(state) = &self.panel_resize_state else {
            return;
        };
        if !event.dragging() {
            self.panel_resize_state = None;
            cx.notify();
            return;
        }

        let delta_x = f32::from(event.position.x) - state.start_pointer_x;
        let new_width =
            (state.start_width - delta_x).clamp(RIGHT_PANEL_MIN_WIDTH, RIGHT_PANEL_MAX_WIDTH);
        if (new_width - self.right_panel_width).abs() > f32::EPSILON {
            self.right_panel_width = new_width;
            cx.notify();
        }
    }

    fn finish_panel_resize(&mut self, _: &MouseUpEvent, _: &mut Window, cx: &mut Context<'_, Self>) {
        if self.panel_resize_state.take().is_some() {
            cx.notify();
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every texture until it is dropped explicitly.
            cx.drop_image(old_image, Some(window));
        }
    }
}
