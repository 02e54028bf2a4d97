#![allow(dead_code)]

pub use dockwatch_test_utils::builders;
pub use dockwatch_test_utils::fake_engine::FakeEngine;
pub use dockwatch_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Root used by every mock-filesystem test.
pub const ROOT: &str = "/project";
