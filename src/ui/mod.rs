use std::{mem, path::Path, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use gpui::prelude::FluentBuilder;
use gpui::{
    AnyElement, App, AppContext, Context, Hsla, InteractiveElement, IntoElement, ObjectFit,
    ParentElement, Render, RenderImage, SharedString, Styled, StyledImage, TitlebarOptions,
    Window, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    config::AppConfig,
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    pipeline::{
        CameraDevice, CameraStream, FerPlusEngine, FrameFanout, HandTracker, OrtHandpose,
        WorkerHandle, camera, start_expression_worker, start_hand_worker,
    },
    session::DrawingSession,
    types::{ExpressionSample, Frame, HandSample},
};

mod camera_view;
mod download;
mod main_view;
mod render_util;

use download::{DownloadMessage, ModelStatus};

// Results queue up between renders; frames never do.
const RESULT_QUEUE: usize = 64;

pub fn launch_ui(app: &mut App, config: AppConfig, session: DrawingSession) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Mood Canvas".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config, session));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    config: AppConfig,
    session: DrawingSession,
    fanout: FrameFanout,
    preview_rx: Receiver<Frame>,
    worker_inputs: Option<WorkerInputs>,
    hand_rx: Receiver<HandSample>,
    expression_rx: Receiver<ExpressionSample>,
    hand_worker: Option<WorkerHandle>,
    expression_worker: Option<WorkerHandle>,
    camera_stream: Option<CameraStream>,
    available_cameras: Vec<CameraDevice>,
    camera_label: Option<String>,
    frame_size: Option<(u32, u32)>,
    hand_confidence: f32,
    preview_image: Option<Arc<RenderImage>>,
    canvas_image: Option<Arc<RenderImage>>,
    canvas_dirty: bool,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
}

/// Channel ends the workers take over once the models are in place.
struct WorkerInputs {
    hand_frames: Receiver<Frame>,
    expression_frames: Receiver<Frame>,
    hand_results: Sender<HandSample>,
    expression_results: Sender<ExpressionSample>,
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
        selected: usize,
        start_error: Option<String>,
    },
    Ready,
}

struct DownloadState {
    models: Vec<(ModelKind, ModelStatus)>,
    finished: bool,
    proceed: bool,
}

impl AppView {
    fn new(config: AppConfig, session: DrawingSession) -> Self {
        let (preview_tx, preview_rx) = bounded(1);
        let (hand_frame_tx, hand_frames) = bounded(1);
        let (expression_frame_tx, expression_frames) = bounded(1);
        let (hand_results, hand_rx) = bounded(RESULT_QUEUE);
        let (expression_results, expression_rx) = bounded(RESULT_QUEUE);

        let (download_tx, download_rx) = unbounded();
        let download_handle = download::spawn_model_download(config.models.dir.clone(), download_tx);
        let (initial_camera_state, available_cameras) = Self::initial_camera_state();

        Self {
            screen: Screen::Camera(initial_camera_state),
            config,
            session,
            fanout: FrameFanout {
                preview: preview_tx,
                hand: hand_frame_tx,
                expression: expression_frame_tx,
            },
            preview_rx,
            worker_inputs: Some(WorkerInputs {
                hand_frames,
                expression_frames,
                hand_results,
                expression_results,
            }),
            hand_rx,
            expression_rx,
            hand_worker: None,
            expression_worker: None,
            camera_stream: None,
            available_cameras,
            camera_label: None,
            frame_size: None,
            hand_confidence: 0.0,
            preview_image: None,
            canvas_image: None,
            canvas_dirty: true,
            download_rx,
            _download_handle: download_handle,
        }
    }

    /// Starts both workers. Each loads its own model, so a missing one only
    /// takes its own modality down.
    fn start_workers_if_needed(&mut self) {
        let Some(inputs) = self.worker_inputs.take() else {
            return;
        };
        let dir = self.config.models.dir.as_path();

        let hand_model = ModelKind::HandposeEstimator.path_in(dir);
        match start_hand_worker(
            move || Ok(HandTracker::new(OrtHandpose::new(&hand_model)?)),
            inputs.hand_frames,
            inputs.hand_results,
        ) {
            Ok(worker) => self.hand_worker = Some(worker),
            Err(err) => log::error!("failed to start hand worker: {err:?}"),
        }

        let expression_model = ModelKind::EmotionFerPlus.path_in(dir);
        let min_confidence = self.config.emotion.min_face_confidence;
        match start_expression_worker(
            move || FerPlusEngine::new(&expression_model, min_confidence),
            self.config.emotion.poll_interval(),
            inputs.expression_frames,
            inputs.expression_results,
        ) {
            Ok(worker) => self.expression_worker = Some(worker),
            Err(err) => log::error!("failed to start expression worker: {err:?}"),
        }
    }

    /// Drops a capture stream that gave up and returns why.
    fn take_camera_failure(&mut self) -> Option<String> {
        let message = self.camera_stream.as_ref()?.failure()?;
        log::error!("camera lost: {message}");
        if let Some(stream) = self.camera_stream.take() {
            stream.stop();
        }
        self.camera_label = None;
        self.frame_size = None;
        Some(message)
    }

    fn models_dir(&self) -> &Path {
        &self.config.models.dir
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        if let Some(message) = self.take_camera_failure() {
            self.screen = Screen::Camera(CameraState::Unavailable { message });
        }

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::Camera(mut state) => {
                let view = self.render_camera_view(&mut state, cx);
                screen = match state {
                    CameraState::Ready => Screen::Download(DownloadState::new()),
                    other => Screen::Camera(other),
                };
                view
            }
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                let view = self.render_download_view(&state, cx);
                if state.ready_to_leave() {
                    log::info!("models prepared under {}", self.models_dir().display());
                    self.start_workers_if_needed();
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
