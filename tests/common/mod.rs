#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub use codesync_test_utils::{
    ConfigBuilder, FakeWatchSource, RecordingSink, RootBuilder, init_tracing, wait_until,
    with_timeout,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: impl AsRef<Path>, content: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write file");
}

/// File contents, or `None` if it can't be read.
pub fn read_file(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path).ok()
}
