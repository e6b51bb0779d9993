use std::{path::PathBuf, thread};

use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, DownloadState, IntoElement,
    ModelDownloadEvent, ModelKind, ParentElement, Sender, SharedString, Styled, StyledExt, Tag,
    div, ensure_model_ready, h_flex, v_flex,
};

pub(super) enum DownloadMessage {
    Event(ModelDownloadEvent),
    Failed { model: ModelKind, error: String },
    Done,
}

#[derive(Clone, Debug, PartialEq)]
pub(super) enum ModelStatus {
    Pending,
    Downloading { downloaded: u64, total: Option<u64> },
    Ready,
    Failed(String),
}

impl DownloadState {
    pub(super) fn new() -> Self {
        Self {
            models: ModelKind::ALL
                .iter()
                .map(|kind| (*kind, ModelStatus::Pending))
                .collect(),
            finished: false,
            proceed: false,
        }
    }

    fn status_mut(&mut self, model: ModelKind) -> Option<&mut ModelStatus> {
        self.models
            .iter_mut()
            .find(|(kind, _)| *kind == model)
            .map(|(_, status)| status)
    }

    pub(super) fn apply(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::Event(event) => match event {
                ModelDownloadEvent::AlreadyPresent { model } | ModelDownloadEvent::Finished { model } => {
                    if let Some(status) = self.status_mut(model) {
                        *status = ModelStatus::Ready;
                    }
                }
                ModelDownloadEvent::Started { model, total } => {
                    if let Some(status) = self.status_mut(model) {
                        *status = ModelStatus::Downloading {
                            downloaded: 0,
                            total,
                        };
                    }
                }
                ModelDownloadEvent::Progress {
                    model,
                    downloaded,
                    total,
                } => {
                    if let Some(status) = self.status_mut(model) {
                        *status = ModelStatus::Downloading { downloaded, total };
                    }
                }
            },
            DownloadMessage::Failed { model, error } => {
                if let Some(status) = self.status_mut(model) {
                    *status = ModelStatus::Failed(error);
                }
            }
            DownloadMessage::Done => self.finished = true,
        }
    }

    pub(super) fn has_failures(&self) -> bool {
        self.models
            .iter()
            .any(|(_, status)| matches!(status, ModelStatus::Failed(_)))
    }

    /// All models settled and either all are present or the user chose to go
    /// on without the missing ones.
    pub(super) fn ready_to_leave(&self) -> bool {
        self.finished && (self.proceed || !self.has_failures())
    }
}

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            state.apply(msg);
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .w(super::px(460.0))
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                div()
                    .font_semibold()
                    .text_color(theme.foreground)
                    .child("Preparing models"),
            );

        for (kind, status) in &state.models {
            let (icon, color) = match status {
                ModelStatus::Ready => ("✓", theme.success),
                ModelStatus::Failed(_) => ("✗", theme.danger),
                _ => ("⟳", theme.foreground),
            };
            let detail = match status {
                ModelStatus::Pending => "waiting".to_string(),
                ModelStatus::Downloading { downloaded, total } => {
                    progress_bar_string(*downloaded, *total)
                }
                ModelStatus::Ready => "ready".to_string(),
                ModelStatus::Failed(_) => "unavailable".to_string(),
            };

            container = container.child(
                v_flex()
                    .gap_1()
                    .child(
                        h_flex()
                            .gap_2()
                            .child(div().text_color(color).child(icon))
                            .child(div().text_color(theme.foreground).child(kind.label())),
                    )
                    .child(
                        div()
                            .px_3()
                            .py_1()
                            .rounded_md()
                            .bg(theme.muted)
                            .font_family(theme.mono_font_family.clone())
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(detail),
                    ),
            );

            if let ModelStatus::Failed(err) = status {
                container = container.child(Tag::danger().rounded_full().child(err.clone()));
            }
        }

        if state.finished && state.has_failures() {
            container = container.child(
                Button::new(SharedString::from("download-continue"))
                    .primary()
                    .label("Continue without missing models")
                    .on_click(cx.listener(|this, _, _, cx| {
                        if let super::Screen::Download(state) = &mut this.screen {
                            state.proceed = true;
                        }
                        cx.notify();
                    })),
            );
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

/// Fetches every model in turn on a background thread. A failed model is
/// reported and the next one is still attempted.
pub(super) fn spawn_model_download(
    models_dir: PathBuf,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for kind in ModelKind::ALL {
            let path = kind.path_in(&models_dir);
            let result = ensure_model_ready(kind, &path, |event| {
                let _ = tx.send(DownloadMessage::Event(event));
            });

            if let Err(err) = result {
                log::error!("failed to prepare {} model: {err:?}", kind.label());
                let _ = tx.send(DownloadMessage::Failed {
                    model: kind,
                    error: format!("{err:#}"),
                });
            }
        }
        let _ = tx.send(DownloadMessage::Done);
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
        _ => format!("{} KB, size unknown", downloaded / 1024),
    }
}
