use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, CameraDevice, CameraState, Context,
    DownloadState, FluentBuilder, InteractiveElement, IntoElement, ParentElement, Screen,
    SharedString, Styled, StyledExt, camera, div, h_flex, v_flex,
};

impl AppView {
    pub(super) fn initial_camera_state() -> (CameraState, Vec<CameraDevice>) {
        match camera::available_cameras() {
            Ok(cameras) if cameras.is_empty() => (
                CameraState::Unavailable {
                    message: "No camera was found.".to_string(),
                },
                Vec::new(),
            ),
            Ok(cameras) => (
                CameraState::Selection {
                    selected: 0,
                    start_error: None,
                },
                cameras,
            ),
            Err(err) => {
                log::error!("failed to enumerate cameras: {err:?}");
                (
                    CameraState::Unavailable {
                        message: format!("Camera access failed: {err:#}"),
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
                let theme = cx.theme();
                v_flex()
                    .size_full()
                    .items_center()
                    .justify_center()
                    .bg(theme.background)
                    .child(
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
                                    .text_color(theme.danger)
                                    .font_semibold()
                                    .child("⚠ Camera unavailable"),
                            )
                            .child(
                                div()
                                    .text_xs()
                                    .text_color(theme.muted_foreground)
                                    .child("Check the camera connection and permissions, then restart."),
                            )
                            .child(div().text_color(theme.foreground).child(message.clone())),
                    )
                    .into_any_element()
            }
            CameraState::Selection {
                selected,
                start_error,
            } => {
                // A single camera is started straight away.
                if self.available_cameras.len() == 1 && start_error.is_none() {
                    match self.start_camera(0) {
                        Ok(()) => {
                            *state = CameraState::Ready;
                            return div().child("Starting camera...").into_any_element();
                        }
                        Err(err) => *start_error = Some(err),
                    }
                }

                let picker = self.render_camera_picker(*selected, start_error.as_deref(), cx);
                v_flex()
                    .size_full()
                    .items_center()
                    .justify_center()
                    .bg(cx.theme().background)
                    .child(div().w(super::px(420.0)).child(picker))
                    .into_any_element()
            }
            CameraState::Ready => div().child("Starting camera...").into_any_element(),
        }
    }

    fn render_camera_picker(
        &self,
        selected_idx: usize,
        error_msg: Option<&str>,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let (foreground, muted, accent, danger) = (
            theme.foreground,
            theme.muted_foreground,
            theme.accent,
            theme.danger,
        );

        let devices = self
            .available_cameras
            .iter()
            .enumerate()
            .map(|(idx, device)| {
                let is_selected = selected_idx == idx;
                h_flex()
                    .w_full()
                    .gap_2()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .cursor_pointer()
                    .when(is_selected, |this| this.bg(accent))
                    .on_mouse_down(
                        gpui::MouseButton::Left,
                        cx.listener(move |this, _, _, cx| {
                            this.select_camera(idx);
                            cx.notify();
                        }),
                    )
                    .child(
                        div()
                            .flex_1()
                            .text_sm()
                            .text_color(foreground)
                            .text_ellipsis()
                            .child(device.label.clone()),
                    )
                    .when(is_selected, |this| this.child(div().text_color(muted).child("●")))
            });

        v_flex()
            .gap_3()
            .p_4()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                v_flex()
                    .gap_1()
                    .child(div().font_semibold().text_color(foreground).child("Pick a camera"))
                    .child(div().text_xs().text_color(muted).child(format!(
                        "{} device(s) found. Your hand and face both need to be in view.",
                        self.available_cameras.len()
                    ))),
            )
            .child(v_flex().gap_1().children(devices))
            .when_some(error_msg, |this, err| {
                this.child(div().text_xs().text_color(danger).child(err.to_string()))
            })
            .child(
                Button::new(SharedString::from("camera-confirm"))
                    .primary()
                    .label("Start drawing")
                    .w_full()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.start_selected_camera();
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    fn select_camera(&mut self, idx: usize) {
        if let Screen::Camera(CameraState::Selection {
            selected,
            start_error,
        }) = &mut self.screen
        {
            if idx < self.available_cameras.len() {
                *selected = idx;
                *start_error = None;
            }
        }
    }

    fn start_selected_camera(&mut self) {
        let Screen::Camera(CameraState::Selection { selected, .. }) = &self.screen else {
            return;
        };
        let selected = *selected;

        match self.start_camera(selected) {
            Ok(()) => self.screen = Screen::Download(DownloadState::new()),
            Err(err) => {
                if let Screen::Camera(CameraState::Selection { start_error, .. }) = &mut self.screen {
                    *start_error = Some(err);
                }
            }
        }
    }

    fn start_camera(&mut self, idx: usize) -> Result<(), String> {
        let device = self
            .available_cameras
            .get(idx)
            .cloned()
            .ok_or_else(|| "The selected camera is gone.".to_string())?;

        if let Some(stream) = self.camera_stream.take() {
            stream.stop();
        }
        let stream = camera::start_camera_stream(device.index.clone(), self.fanout.clone())
            .map_err(|err| format!("Could not start {}: {err:#}", device.label))?;

        log::info!("camera started: {}", device.label);
        self.camera_stream = Some(stream);
        self.camera_label = Some(device.label);
        Ok(())
    }
}
