use std::thread;

use crossbeam_channel::Sender;
use gpui::{AnyElement, Context, IntoElement, ParentElement, SharedString, Styled, div};
use gpui_component::{
    ActiveTheme, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};

use super::{AppView, DownloadMessage, DownloadState};
use crate::{
    model_download::{ModelDownloadEvent, ensure_model_ready},
    pipeline::RecognizerBackend,
};

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            match msg {
                DownloadMessage::Event(ModelDownloadEvent::AlreadyPresent { model }) => {
                    state.current = Some(model.label());
                    state.message = format!("{} model already present", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Started { model, total }) => {
                    state.current = Some(model.label());
                    state.downloaded = 0;
                    state.total = total;
                    state.message = format!("Downloading {} model...", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Progress {
                    downloaded, total, ..
                }) => {
                    state.downloaded = downloaded;
                    state.total = total;
                }
                DownloadMessage::Event(ModelDownloadEvent::Finished { model }) => {
                    state.ready_models += 1;
                    state.message = format!("{} model ready", model.label());
                }
                DownloadMessage::AllReady => {
                    state.finished = true;
                    state.message = "Models ready, opening the board...".to_string();
                }
                DownloadMessage::Error(err) => {
                    state.error = Some(err);
                    state.finished = false;
                    state.message = "Model download failed".to_string();
                }
            }
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let fallback = state.error.is_some().then(|| {
            Button::new(SharedString::from("download-mouse-only"))
                .outline()
                .label("Continue with the mouse")
                .on_click(cx.listener(|this, _, _, cx| {
                    this.enter_mouse_only();
                    cx.notify();
                }))
        });

        let theme = cx.theme();
        let bar = progress_bar_string(state.downloaded, state.total);
        let detail = match (state.total, state.finished) {
            (_, true) => "Done".to_string(),
            (Some(total), false) if total > 0 => {
                let percent = (state.downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                format!("{} · {percent:.1}%", state.current.unwrap_or("model"))
            }
            _ => format!("Downloaded {} KB", state.downloaded / 1024),
        };

        let (status_icon, status_text, status_color) = if state.finished && state.error.is_none() {
            ("✓", "Models ready", theme.success)
        } else if state.error.is_some() {
            ("✗", "Model download failed", theme.accent)
        } else {
            ("⟳", "Downloading models", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(status_color)
                            .font_semibold()
                            .child(format!("{status_icon} {status_text}")),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(format!("hand tracking models ({}/2)", state.ready_models.min(2))),
                    ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(bar),
            )
            .child(div().text_sm().text_color(theme.muted_foreground).child(detail))
            .child(div().text_color(theme.foreground).child(state.message.clone()));

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }
        if let Some(button) = fallback {
            container = container.child(button);
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

/// Fetches every model the recognizer needs, one after another.
pub(super) fn spawn_model_download(
    backend: RecognizerBackend,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for (kind, path) in backend.models() {
            let result = ensure_model_ready(kind, &path, |event| {
                let _ = tx.send(DownloadMessage::Event(event));
            });
            if let Err(err) = result {
                log::error!("failed to download {} model: {err:?}", kind.label());
                let _ = tx.send(DownloadMessage::Error(format!("{err:#}")));
                return;
            }
        }
        let _ = tx.send(DownloadMessage::AllReady);
    })
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => {
            let head = (downloaded / 64) as usize % BAR_LEN + 1;
            format!("[{:-<head$}] unknown size", ">")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::progress_bar_string;

    #[test]
    fn known_size_fills_proportionally() {
        assert_eq!(
            progress_bar_string(50, Some(100)),
            format!("[{}{}]  50.0%", "=".repeat(15), " ".repeat(15))
        );
    }

    #[test]
    fn overshoot_is_capped() {
        assert!(progress_bar_string(500, Some(100)).ends_with("100.0%"));
    }

    #[test]
    fn unknown_size_shows_spinner() {
        assert_eq!(progress_bar_string(0, None), "[>] unknown size");
        assert_eq!(progress_bar_string(64, None), "[>-] unknown size");
    }
}
