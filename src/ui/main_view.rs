use super::render_util::{compose_canvas, preview_pixels, rgba_to_image};
use super::{
    ActiveTheme, AnyElement, AppView, Arc, Button, ButtonVariants, Context, Hsla, IntoElement,
    ObjectFit, ParentElement, RenderImage, SharedString, Styled, StyledExt, StyledImage, Window,
    div, h_flex, img, v_flex,
};
use crate::{emotion::BrushColor, pipeline::WorkerStatus};

const PANEL_WIDTH: f32 = 320.0;
// Matches the `p_4`/`gap_4` spacing of the main layout.
const PADDING: f32 = 16.0;
const PREVIEW_HEIGHT: f32 = 240.0;

impl AppView {
    /// Pulls everything the workers produced since the last frame into the
    /// session. Expression results go first so hand samples drawn this frame
    /// already use the newest color.
    fn drain_results(&mut self) {
        while let Ok(sample) = self.expression_rx.try_recv() {
            self.session.observe_emotion(sample.scores.as_ref());
        }
        while let Ok(sample) = self.hand_rx.try_recv() {
            self.session.on_hand_sample(&sample);
            self.hand_confidence = sample.confidence;
            self.canvas_dirty = true;
        }
    }

    fn refresh_preview(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(frame) = self.preview_rx.try_iter().last() else {
            return;
        };
        self.frame_size = Some((frame.width, frame.height));
        match preview_pixels(&frame, self.session.mirrored()) {
            Ok(rgba) => {
                if let Some(image) = rgba_to_image(rgba, frame.width, frame.height) {
                    Self::swap_image(&mut self.preview_image, image, window, cx);
                }
            }
            Err(err) => log::warn!("failed to build camera preview: {err:?}"),
        }
    }

    /// Keeps the surface the same size as the area it is shown in.
    fn fit_canvas(&mut self, window: &Window) {
        let viewport = window.viewport_size();
        let width = (f32::from(viewport.width) - PANEL_WIDTH - PADDING * 3.0).max(1.0);
        let height = (f32::from(viewport.height) - PADDING * 2.0).max(1.0);
        let (width, height) = (width.floor() as u32, height.floor() as u32);

        let surface = self.session.surface();
        if (surface.width(), surface.height()) == (width, height) {
            return;
        }
        match self.session.resize(width, height) {
            Ok(()) => self.canvas_dirty = true,
            Err(err) => log::warn!("failed to resize canvas: {err}"),
        }
    }

    fn refresh_canvas(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if !self.canvas_dirty && self.canvas_image.is_some() {
            return;
        }
        let surface = self.session.surface();
        let rgba = compose_canvas(
            surface,
            self.session.last_signal(),
            self.session.emotion().color,
        );
        if let Some(image) = rgba_to_image(rgba, surface.width(), surface.height()) {
            Self::swap_image(&mut self.canvas_image, image, window, cx);
        }
        self.canvas_dirty = false;
    }

    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        self.drain_results();
        self.fit_canvas(window);
        self.refresh_preview(window, cx);
        self.refresh_canvas(window, cx);

        let surface = self.session.surface();
        let canvas: AnyElement = match &self.canvas_image {
            Some(image) => img(image.clone())
                .w(super::px(surface.width() as f32))
                .h(super::px(surface.height() as f32))
                .object_fit(ObjectFit::Fill)
                .into_any_element(),
            None => div().into_any_element(),
        };

        let preview: AnyElement = match &self.preview_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element(),
        };

        let panel = v_flex()
            .w(super::px(PANEL_WIDTH))
            .h_full()
            .gap_3()
            .child(
                div()
                    .w_full()
                    .h(super::px(PREVIEW_HEIGHT))
                    .rounded_lg()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(preview),
            )
            .child(self.render_status(cx))
            .child(
                Button::new(SharedString::from("canvas-clear"))
                    .outline()
                    .label("Clear canvas")
                    .w_full()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.session.clear();
                        this.canvas_dirty = true;
                        cx.notify();
                    })),
            );

        h_flex()
            .size_full()
            .gap_4()
            .p_4()
            .items_start()
            .bg(gpui::rgb(0x0b0f17))
            .child(
                div()
                    .rounded_lg()
                    .overflow_hidden()
                    .child(canvas),
            )
            .child(panel)
            .into_any_element()
    }

    fn render_status(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let reading = self.session.emotion();
        let signal = self.session.last_signal();

        let row = |label: &str, value: String| {
            h_flex()
                .justify_between()
                .text_xs()
                .child(div().text_color(theme.muted_foreground).child(label.to_string()))
                .child(div().text_color(theme.foreground).child(value))
        };
        let flag = |on: bool| (if on { "yes" } else { "no" }).to_string();
        let worker = |status: Option<WorkerStatus>| {
            status.map_or("not started", |s| s.label()).to_string()
        };

        v_flex()
            .w_full()
            .gap_2()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .w(super::px(14.0))
                            .h(super::px(14.0))
                            .rounded_full()
                            .bg(swatch(reading.color)),
                    )
                    .child(
                        div()
                            .font_semibold()
                            .text_color(theme.foreground)
                            .child(format!("{} {}", reading.emotion.emoji(), reading.emotion)),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(format!("{:.0}%", reading.confidence * 100.0)),
                    ),
            )
            .child(row(
                "Hand",
                if signal.cursor.is_some() {
                    format!("tracked ({:.0}%)", self.hand_confidence * 100.0)
                } else {
                    "not found".to_string()
                },
            ))
            .child(row("Drawing", flag(signal.is_drawing)))
            .child(row("Depth", format!("{:.2}", signal.depth)))
            .child(row("Brush", format!("{:.0} px", signal.brush_size)))
            .child(row(
                "Hand tracker",
                worker(self.hand_worker.as_ref().map(|w| w.status())),
            ))
            .child(row(
                "Expression reader",
                worker(self.expression_worker.as_ref().map(|w| w.status())),
            ))
            .child(row(
                "Camera",
                match (&self.camera_label, self.frame_size) {
                    (Some(label), Some((w, h))) => format!("{label} {w}x{h}"),
                    (Some(label), None) => format!("{label}, waiting..."),
                    _ => "none".to_string(),
                },
            ))
            .into_any_element()
    }

    fn swap_image(
        slot: &mut Option<Arc<RenderImage>>,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = slot.replace(new_image) {
            // Drop the previous GPU texture or the sprite atlas keeps every frame.
            cx.drop_image(old_image, Some(window));
        }
    }
}

fn swatch(color: BrushColor) -> Hsla {
    gpui::rgb(color.to_hex()).into()
}
