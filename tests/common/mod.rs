// tests/common/mod.rs

#![allow(dead_code)]

pub use taskdag_test_utils::init_tracing;
pub use taskdag_test_utils::recording::{RecordedEvent, RecordingObserver};
