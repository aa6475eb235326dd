pub mod capture_flow;

pub use capture_flow::{CaptureFlow, CaptureStage};
