use gpui::{
    AnyElement, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Styled, Window,
    WindowControlArea, div, px,
};
use gpui_component::h_flex;

#[cfg(target_os = "windows")]
use gpui::SharedString;

use super::AppView;

/// One status pill: colour, icon, text.
pub(super) type StatusPill = (Hsla, &'static str, String);

impl AppView {
    pub(super) fn render_titlebar(
        &self,
        pills: [StatusPill; 2],
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        #[cfg(target_os = "windows")]
        let controls = self.render_windows_controls(window, cx);

        #[cfg(target_os = "macos")]
        let controls = self.render_macos_controls(window, cx);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let controls = self.render_linux_controls(window, cx);

        let mut status = h_flex()
            .gap_3()
            .pl(px(80.0))
            .pr_3()
            .h_full()
            .items_center()
            .child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child("Gesture Board"),
            );
        for (color, icon, text) in pills {
            status = status.child(
                div()
                    .px_2()
                    .py_0p5()
                    .rounded_md()
                    .bg(gpui::rgba(0x00000033))
                    .text_xs()
                    .text_color(color)
                    .child(format!("{icon} {text}")),
            );
        }

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(px(32.0))
            .w_full()
            .items_center()
            .justify_between()
            .bg(gpui::rgb(0x1a2332))
            .child(status)
            .child(controls)
            .into_any_element()
    }

    #[cfg(target_os = "windows")]
    fn render_windows_controls(
        &self,
        window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let glyph = |id: &'static str, area: WindowControlArea, glyph: &'static str, hover: Hsla| {
            div()
                .id(id)
                .flex()
                .items_center()
                .justify_center()
                .occlude()
                .w(px(46.0))
                .h_full()
                .text_size(px(10.0))
                .hover(move |s| s.bg(hover))
                .window_control_area(area)
                .child(glyph)
        };
        let hover: Hsla = gpui::rgb(0x404040).into();
        let close_hover: Hsla = gpui::rgb(0xe81120).into();
        let maximize = if window.is_maximized() {
            "\u{e923}"
        } else {
            "\u{e922}"
        };

        h_flex()
            .id("windows-window-controls")
            .font_family(SharedString::from("Segoe Fluent Icons"))
            .h(px(32.0))
            .child(glyph("minimize", WindowControlArea::Min, "\u{e921}", hover))
            .child(glyph("maximize-or-restore", WindowControlArea::Max, maximize, hover))
            .child(glyph("close", WindowControlArea::Close, "\u{e8bb}", close_hover))
            .into_any_element()
    }

    #[cfg(target_os = "macos")]
    fn render_macos_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        // Traffic lights are drawn by the system.
        div().into_any_element()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn render_linux_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let icon = |id: &'static str, area: WindowControlArea, path: &'static str, hover: Hsla| {
            div()
                .id(id)
                .size(px(28.0))
                .flex()
                .items_center()
                .justify_center()
                .rounded_md()
                .cursor_pointer()
                .window_control_area(area)
                .hover(move |s| s.bg(hover))
                .child(
                    gpui::svg()
                        .size(px(16.0))
                        .path(path)
                        .text_color(gpui::rgb(0xc9d1d9)),
                )
        };
        let hover: Hsla = gpui::rgb(0x1f2428).into();
        let close_hover: Hsla = gpui::rgb(0xe81123).into();

        h_flex()
            .gap_1()
            .px_2()
            .child(icon("linux-minimize", WindowControlArea::Min, "M 4,8 H 12", hover))
            .child(icon(
                "linux-maximize",
                WindowControlArea::Max,
                "M 4,4 H 12 V 12 H 4 Z",
                hover,
            ))
            .child(icon(
                "linux-close",
                WindowControlArea::Close,
                "M 4,4 L 12,12 M 12,4 L 4,12",
                close_hover,
            ))
            .into_any_element()
    }
}
