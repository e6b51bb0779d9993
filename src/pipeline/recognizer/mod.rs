mod common;
pub mod expression;
pub mod hand;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TrySendError};

use crate::{
    emotion::EmotionScores,
    types::{ExpressionSample, Frame, HandSample},
};

use self::hand::HandEstimate;

/// How often an idle worker wakes up to look at its stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

pub trait HandposeEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> Result<HandEstimate>;
}

pub trait ExpressionEngine: Send + 'static {
    /// `Ok(None)` means no face could be read from the frame.
    fn infer(&mut self, frame: &Frame) -> Result<Option<EmotionScores>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    Loading,
    Running,
    Unavailable,
    Stopped,
}

impl WorkerStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Loading,
            1 => Self::Running,
            2 => Self::Unavailable,
            _ => Self::Stopped,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Unavailable => "unavailable",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Clone, Debug)]
struct WorkerControl {
    stop: Arc<AtomicBool>,
    status: Arc<AtomicU8>,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            status: Arc::new(AtomicU8::new(WorkerStatus::Loading as u8)),
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }
}

/// Owns a worker thread. Stopping (or dropping) sets the stop flag and joins,
/// after which the worker has sent its last result.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    control: WorkerControl,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.control.status.load(Ordering::SeqCst))
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.control.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} worker panicked", self.name);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

fn spawn_worker<E, F, L>(name: &'static str, load: F, run: L) -> Result<WorkerHandle>
where
    F: FnOnce() -> Result<E> + Send + 'static,
    L: FnOnce(E, &WorkerControl) + Send + 'static,
{
    let control = WorkerControl::new();
    let thread_control = control.clone();

    let handle = thread::Builder::new()
        .name(format!("{name}-worker"))
        .spawn(move || {
            let engine = match load() {
                Ok(engine) => engine,
                Err(err) => {
                    log::error!("failed to load {name} model: {err:?}");
                    thread_control.set_status(WorkerStatus::Unavailable);
                    return;
                }
            };
            log::info!("{name} worker ready");
            thread_control.set_status(WorkerStatus::Running);
            run(engine, &thread_control);
            thread_control.set_status(WorkerStatus::Stopped);
            log::info!("{name} worker stopped");
        })
        .with_context(|| format!("failed to spawn {name} worker"))?;

    Ok(WorkerHandle {
        name,
        control,
        handle: Some(handle),
    })
}

/// Runs hand inference on every frame it gets to, dropping backlog so results
/// stay close to real time.
pub fn start_hand_worker<E, F>(
    load: F,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<HandSample>,
) -> Result<WorkerHandle>
where
    E: HandposeEngine,
    F: FnOnce() -> Result<E> + Send + 'static,
{
    spawn_worker("hand", load, move |engine, control| {
        run_hand_loop(engine, &frame_rx, &result_tx, control)
    })
}

/// Keeps the newest frame and classifies it once per `interval`.
pub fn start_expression_worker<E, F>(
    load: F,
    interval: Duration,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<ExpressionSample>,
) -> Result<WorkerHandle>
where
    E: ExpressionEngine,
    F: FnOnce() -> Result<E> + Send + 'static,
{
    spawn_worker("expression", load, move |engine, control| {
        run_expression_loop(engine, interval, &frame_rx, &result_tx, control)
    })
}

fn run_hand_loop<E: HandposeEngine>(
    mut engine: E,
    frame_rx: &Receiver<Frame>,
    result_tx: &Sender<HandSample>,
    control: &WorkerControl,
) {
    let mut results = HandResults::new(result_tx);

    while !control.stopped() {
        let frame = match recv_latest_frame(frame_rx, STOP_POLL) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(_) => break,
        };

        let sample = match engine.infer(&frame) {
            Ok(estimate) => HandSample {
                landmarks: estimate.landmarks,
                confidence: estimate.confidence,
                after_dropped: false,
            },
            Err(err) => {
                log::warn!("handpose inference failed: {err:?}");
                HandSample::missing()
            }
        };
        log::trace!("hand sample ready {:?} after capture", frame.timestamp.elapsed());

        if control.stopped() || !results.send(sample) {
            break;
        }
    }
}

/// Hand result queue that remembers drops and marks the next sample that
/// gets through, so a lost "no hand" cannot join two strokes.
struct HandResults<'a> {
    tx: &'a Sender<HandSample>,
    dropped: bool,
}

impl<'a> HandResults<'a> {
    fn new(tx: &'a Sender<HandSample>) -> Self {
        Self { tx, dropped: false }
    }

    /// Returns false once the receiver is gone.
    fn send(&mut self, mut sample: HandSample) -> bool {
        sample.after_dropped = self.dropped;
        match deliver(self.tx, sample) {
            Delivery::Sent => self.dropped = false,
            Delivery::Dropped => self.dropped = true,
            Delivery::Closed => return false,
        }
        true
    }
}

fn run_expression_loop<E: ExpressionEngine>(
    mut engine: E,
    interval: Duration,
    frame_rx: &Receiver<Frame>,
    result_tx: &Sender<ExpressionSample>,
    control: &WorkerControl,
) {
    let mut next_tick = Instant::now() + interval;
    let mut latest: Option<Frame> = None;

    while !control.stopped() {
        let wait = next_tick.saturating_duration_since(Instant::now()).min(STOP_POLL);
        match recv_latest_frame(frame_rx, wait) {
            Ok(Some(frame)) => latest = Some(frame),
            Ok(None) => {}
            Err(_) => break,
        }

        let now = Instant::now();
        if now < next_tick {
            continue;
        }
        // Skip missed ticks rather than bursting to catch up.
        next_tick = (next_tick + interval).max(now);

        let Some(frame) = latest.take() else { continue };
        let scores = match engine.infer(&frame) {
            Ok(scores) => scores,
            Err(err) => {
                log::warn!("expression inference failed: {err:?}");
                continue;
            }
        };
        let sample = ExpressionSample { scores };
        if control.stopped() || deliver(result_tx, sample) == Delivery::Closed {
            break;
        }
    }
}

/// Waits up to `timeout` for a frame, then skips to the newest one queued.
/// `Ok(None)` on timeout, `Err` once the camera side is gone.
fn recv_latest_frame(frame_rx: &Receiver<Frame>, timeout: Duration) -> Result<Option<Frame>, RecvError> {
    let mut frame = match frame_rx.recv_timeout(timeout) {
        Ok(frame) => frame,
        Err(RecvTimeoutError::Timeout) => return Ok(None),
        Err(RecvTimeoutError::Disconnected) => return Err(RecvError),
    };
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Ok(Some(frame))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Sent,
    /// The queue was full and the value was thrown away.
    Dropped,
    Closed,
}

/// Non-blocking send.
fn deliver<T>(tx: &Sender<T>, value: T) -> Delivery {
    match tx.try_send(value) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => {
            log::trace!("result queue full, dropping sample");
            Delivery::Dropped
        }
        Err(TrySendError::Disconnected(_)) => Delivery::Closed,
    }
}
