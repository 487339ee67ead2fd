pub mod controller;
pub mod generator;

pub use controller::{CaptureController, CaptureSink, ScanTiming};
pub use generator::{encode_uploaded_bytes, encode_uploaded_file, generate_synthetic_capture};
