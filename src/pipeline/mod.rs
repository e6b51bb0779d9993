pub mod camera;
pub mod recognizer;
pub mod rgba_converter;

pub use camera::{CameraDevice, CameraStream, FrameFanout, available_cameras, start_camera_stream};
pub use recognizer::{
    WorkerHandle, WorkerStatus,
    expression::FerPlusEngine,
    hand::{HandTracker, OrtHandpose},
    start_expression_worker, start_hand_worker,
};
