use std::sync::Arc;

use gpui::{
    AnyElement, Context, InteractiveElement, IntoElement, MouseButton, MouseDownEvent,
    MouseMoveEvent, MouseUpEvent, ObjectFit, ParentElement, Pixels, Point, RenderImage,
    SharedString, StatefulInteractiveElement, Styled, StyledImage, Window, canvas, div, img,
    prelude::FluentBuilder,
};
use gpui_component::{
    ActiveTheme, Selectable, StyledExt,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use super::{AnalysisState, AppView, render_util::rgba_to_image};
use crate::{
    analysis::{AnalysisError, AnalysisMessage, spawn_analysis},
    board::{BACKGROUND, Tool},
    gesture::PenEvent,
};

impl AppView {
    /// Resizes the board to the last laid-out canvas size and refreshes its
    /// texture when the strokes changed.
    fn sync_board_image(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if let Some(bounds) = self.board_bounds.get() {
            let width = f32::from(bounds.size.width).round().max(0.0) as u32;
            let height = f32::from(bounds.size.height).round().max(0.0) as u32;
            self.board.resize(width, height);
        }

        let revision = self.board.revision();
        if self.board_image_revision == Some(revision) {
            return;
        }
        self.board_image_revision = Some(revision);

        let image = rgba_to_image(
            self.board.raster().to_vec(),
            self.board.width(),
            self.board.height(),
        );
        self.replace_board_image(image, window, cx);
    }

    fn replace_board_image(
        &mut self,
        image: Option<Arc<RenderImage>>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        let old = match image {
            Some(image) => self.board_image.replace(image),
            None => self.board_image.take(),
        };
        if let Some(old) = old {
            cx.drop_image(old, Some(window));
        }
    }

    pub(super) fn render_board(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> AnyElement {
        self.sync_board_image(window, cx);

        let bounds_cell = self.board_bounds.clone();
        let [r, g, b, _] = BACKGROUND;
        let background = gpui::rgb(u32::from_be_bytes([0, r, g, b]));

        div()
            .id("board")
            .relative()
            .flex_1()
            .w_full()
            .min_h(gpui::px(120.0))
            .overflow_hidden()
            .rounded_lg()
            .border_1()
            .border_color(gpui::rgb(0x2d3748))
            .bg(background)
            .cursor_crosshair()
            .child(
                canvas(
                    move |bounds, _window, _app| bounds_cell.set(Some(bounds)),
                    |_, _, _, _| {},
                )
                .absolute()
                .size_full(),
            )
            .when_some(self.board_image.clone(), |this, image| {
                this.child(
                    img(image)
                        .absolute()
                        .size_full()
                        .object_fit(ObjectFit::Fill),
                )
            })
            .on_mouse_down(MouseButton::Left, cx.listener(Self::board_mouse_down))
            .on_mouse_move(cx.listener(Self::board_mouse_move))
            .on_mouse_up(MouseButton::Left, cx.listener(Self::board_mouse_up))
            .on_mouse_up_out(MouseButton::Left, cx.listener(Self::board_mouse_up))
            .into_any_element()
    }

    /// Window position to board pixels, if the canvas has been laid out.
    fn board_point(&self, position: Point<Pixels>) -> Option<(f32, f32)> {
        let bounds = self.board_bounds.get()?;
        let x = f32::from(position.x) - f32::from(bounds.origin.x);
        let y = f32::from(position.y) - f32::from(bounds.origin.y);
        let max_x = (self.board.width() as f32 - 1.0).max(0.0);
        let max_y = (self.board.height() as f32 - 1.0).max(0.0);
        Some((x.clamp(0.0, max_x), y.clamp(0.0, max_y)))
    }

    fn board_mouse_down(
        &mut self,
        event: &MouseDownEvent,
        _: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        let Some(point) = self.board_point(event.position) else {
            return;
        };
        self.mouse_drawing = true;
        self.board.begin_stroke(point);
        cx.notify();
    }

    fn board_mouse_move(
        &mut self,
        event: &MouseMoveEvent,
        _: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if !self.mouse_drawing {
            return;
        }
        if !event.dragging() {
            self.mouse_drawing = false;
            self.board.end_stroke();
            cx.notify();
            return;
        }
        if let Some(point) = self.board_point(event.position) {
            self.board.extend_stroke(point);
            cx.notify();
        }
    }

    fn board_mouse_up(&mut self, _: &MouseUpEvent, _: &mut Window, cx: &mut Context<'_, Self>) {
        if self.mouse_drawing {
            self.mouse_drawing = false;
            self.board.end_stroke();
            cx.notify();
        }
    }

    /// Gesture pen events share the board with the mouse; a mouse stroke in
    /// progress wins.
    pub(super) fn apply_pen_event(&mut self, event: PenEvent) {
        if self.mouse_drawing {
            return;
        }
        match event {
            PenEvent::Down(point) => self.board.begin_stroke(point),
            PenEvent::Move(point) => self.board.extend_stroke(point),
            PenEvent::Up => self.board.end_stroke(),
        }
    }

    pub(super) fn render_toolbar(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let tool = self.board.tool();
        let width = self.board.stroke_width();
        let busy = self.analysis.is_running();

        let tool_button = |id: &'static str, target: Tool, cx: &mut Context<'_, Self>| {
            Button::new(SharedString::from(id))
                .label(target.label())
                .outline()
                .selected(tool == target)
                .on_click(cx.listener(move |this, _, _, cx| {
                    this.board.set_tool(target);
                    cx.notify();
                }))
        };

        h_flex()
            .gap_2()
            .items_center()
            .w_full()
            .child(tool_button("tool-pen", Tool::Pen, cx))
            .child(tool_button("tool-eraser", Tool::Eraser, cx))
            .child(
                Button::new(SharedString::from("width-down"))
                    .ghost()
                    .label("−")
                    .on_click(cx.listener(|this, _, _, cx| {
                        let width = this.board.stroke_width();
                        this.board.set_stroke_width(width.saturating_sub(1));
                        cx.notify();
                    })),
            )
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(format!("width {width}")),
            )
            .child(
                Button::new(SharedString::from("width-up"))
                    .ghost()
                    .label("+")
                    .on_click(cx.listener(|this, _, _, cx| {
                        let width = this.board.stroke_width();
                        this.board.set_stroke_width(width + 1);
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("undo"))
                    .outline()
                    .label("↶ Undo")
                    .on_click(cx.listener(|this, _, _, cx| {
                        if !this.board.undo() {
                            log::debug!("nothing to undo");
                        }
                        cx.notify();
                    })),
            )
            .child(div().flex_1())
            .child(
                Button::new(SharedString::from("reset"))
                    .outline()
                    .label("Reset")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.reset_board();
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("calculate"))
                    .primary()
                    .label(if busy { "Calculating..." } else { "Calculate" })
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.start_analysis();
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    pub(super) fn render_response(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let (title, body, color) = match &self.analysis {
            AnalysisState::Idle => (
                "Response",
                "Draw a problem on the board and press Calculate.".to_string(),
                theme.muted_foreground,
            ),
            AnalysisState::Running => (
                "Response",
                "Thinking about the board...".to_string(),
                theme.muted_foreground,
            ),
            AnalysisState::Answer(text) => ("Response", text.clone(), theme.foreground),
            AnalysisState::Failed(err) => ("Analysis failed", err.clone(), theme.accent),
        };

        v_flex()
            .gap_1()
            .p_3()
            .w_full()
            .max_h(gpui::px(220.0))
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .text_xs()
                    .font_semibold()
                    .text_color(theme.muted_foreground)
                    .child(title),
            )
            .child(
                div()
                    .id("response-text")
                    .overflow_y_scroll()
                    .text_sm()
                    .text_color(color)
                    .child(body),
            )
            .into_any_element()
    }

    /// Snapshots the board and sends it for analysis. The camera is paused
    /// until the answer arrives.
    pub(super) fn start_analysis(&mut self) {
        if self.analysis.is_running() {
            log::debug!("analysis already running, ignoring Calculate");
            return;
        }

        if let Some(event) = self.pinch.release() {
            self.apply_pen_event(event);
        }
        self.board.end_stroke();

        let png = match self.board.snapshot_png() {
            Ok(png) => png,
            Err(err) => {
                log::error!("failed to snapshot board: {err:?}");
                let err = AnalysisError::Snapshot(format!("{err:#}"));
                self.analysis = AnalysisState::Failed(err.to_string());
                return;
            }
        };

        if self.board.is_empty() {
            log::info!("board is empty, asking anyway");
        } else {
            log::info!("analysing board with {} strokes", self.board.strokes().len());
        }
        self.set_camera_paused(true);
        self.analysis = AnalysisState::Running;
        spawn_analysis(self.config.clone(), png, self.analysis_tx.clone());
    }

    pub(super) fn poll_analysis(&mut self) {
        while let Ok(AnalysisMessage::Finished(outcome)) = self.analysis_rx.try_recv() {
            self.analysis = match outcome {
                Ok(answer) => AnalysisState::Answer(answer),
                Err(err) => AnalysisState::Failed(err),
            };
            self.set_camera_paused(false);
        }
    }

    fn set_camera_paused(&mut self, paused: bool) {
        if let Some(stream) = &self.camera_stream {
            stream.set_paused(paused);
        }
    }

    fn reset_board(&mut self) {
        if let Some(event) = self.pinch.release() {
            self.apply_pen_event(event);
        }
        self.mouse_drawing = false;
        self.board.clear();
        if !self.analysis.is_running() {
            self.analysis = AnalysisState::Idle;
        }
    }
}
