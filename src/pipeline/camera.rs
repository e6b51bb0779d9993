use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::types::Frame;

// Decoded formats first; several built-in macOS cameras advertise YUYV but
// refuse to stream it.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

/// Where each captured frame goes. Every consumer gets its own copy and a
/// busy consumer simply misses the frame.
#[derive(Clone)]
pub struct FrameFanout {
    pub preview: Sender<Frame>,
    pub hand: Sender<Frame>,
    pub expression: Sender<Frame>,
}

impl FrameFanout {
    fn publish(&self, frame: Frame) {
        let _ = self.hand.try_send(frame.clone());
        let _ = self.expression.try_send(frame.clone());
        let _ = self.preview.try_send(frame);
    }
}

/// How long the capture thread keeps trying after frames stop coming.
#[derive(Clone, Copy, Debug)]
struct FrameRetry {
    delay: Duration,
    limit: u32,
}

impl FrameRetry {
    // About two seconds of failed reads before the camera is given up on.
    const DEFAULT: Self = Self {
        delay: Duration::from_millis(50),
        limit: 40,
    };
}

/// Why the capture thread stopped on its own, if it did.
#[derive(Clone, Debug, Default)]
struct CaptureFailure(Arc<Mutex<Option<String>>>);

impl CaptureFailure {
    fn report(&self, message: String) {
        if let Ok(mut slot) = self.0.lock() {
            slot.get_or_insert(message);
        }
    }

    fn get(&self) -> Option<String> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    failure: CaptureFailure,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    /// Set once the camera is lost after streaming started.
    pub fn failure(&self) -> Option<String> {
        self.failure.get()
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.halt();
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

fn open_camera(index: &CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        let attempt = Camera::new(index.clone(), requested).and_then(|mut camera| {
            camera.open_stream()?;
            Ok(camera)
        });
        match attempt {
            Ok(camera) => {
                log::info!(
                    "camera {index} streaming {:?} at {}",
                    camera.frame_format(),
                    camera.resolution()
                );
                return Ok(camera);
            }
            Err(err) => last_err = Some(anyhow::Error::from(err)),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("camera {index} supports none of the requested formats")))
}

/// Opens the camera on the calling thread so a failure can be shown to the
/// user, then hands it to a capture thread that publishes to `fanout`.
pub fn start_camera_stream(index: CameraIndex, fanout: FrameFanout) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    drop(open_camera(&index)?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let failure = CaptureFailure::default();
    let thread_failure = failure.clone();

    let handle = thread::Builder::new()
        .name("camera".into())
        .spawn(move || {
            let mut camera = match open_camera(&index) {
                Ok(camera) => camera,
                Err(err) => {
                    log::error!("failed to reopen camera {index}: {err:?}");
                    thread_failure.report(format!("The camera could not be reopened: {err:#}"));
                    return;
                }
            };

            run_capture(
                || read_frame(&mut camera),
                &stop_flag,
                &fanout,
                &thread_failure,
                FrameRetry::DEFAULT,
            );

            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
            log::info!("camera capture stopped");
        })
        .context("failed to spawn camera thread")?;

    Ok(CameraStream {
        stop,
        failure,
        handle: Some(handle),
    })
}

fn read_frame(camera: &mut Camera) -> Result<Frame> {
    let buffer = camera.frame().context("camera frame read failed")?;
    let converted = rgba_converter::convert_camera_frame(&buffer)
        .context("failed to decode camera frame")?;
    Ok(Frame {
        rgba: converted.rgba,
        width: converted.width,
        height: converted.height,
        timestamp: Instant::now(),
    })
}

/// Publishes frames until stopped. A run of `retry.limit` failed reads in a
/// row is reported through `failure` and ends the loop.
fn run_capture<R>(
    mut read: R,
    stop: &AtomicBool,
    fanout: &FrameFanout,
    failure: &CaptureFailure,
    retry: FrameRetry,
) where
    R: FnMut() -> Result<Frame>,
{
    let mut failed_reads = 0;

    while !stop.load(Ordering::Relaxed) {
        let frame = match read() {
            Ok(frame) => frame,
            Err(err) => {
                failed_reads += 1;
                log::warn!("{err:#} ({failed_reads}/{})", retry.limit);
                if failed_reads >= retry.limit {
                    log::error!("camera stopped delivering frames: {err:?}");
                    failure.report(format!("The camera stopped delivering frames: {err:#}"));
                    return;
                }
                thread::sleep(retry.delay);
                continue;
            }
        };
        failed_reads = 0;

        if stop.load(Ordering::Relaxed) {
            break;
        }
        fanout.publish(frame);
    }
}
