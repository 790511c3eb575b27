#![allow(dead_code)]

use std::path::Path;
use std::time::{Duration, Instant};

use bbq_core::{Dispatcher, DispatcherConfig, QueueOptions};

/// Start a dispatcher rooted inside the given directory with a short idle
/// timeout so timers fire promptly in tests.
pub fn dispatcher_at(root: &Path) -> Dispatcher {
    dispatcher_with(root, QueueOptions::default())
}

/// Start a dispatcher with custom queue defaults.
pub fn dispatcher_with(root: &Path, queue_option: QueueOptions) -> Dispatcher {
    bbq_core::telemetry::init_logging();
    let config = DispatcherConfig {
        path: root.to_path_buf(),
        queue_option,
        idle_timeout_ms: 10,
        ..DispatcherConfig::default()
    };
    Dispatcher::new(config).expect("start dispatcher")
}

/// Poll `check` every 20 ms until it returns true or the timeout elapses.
pub fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

/// Count payload files (`*.knmbbq`) anywhere under the root.
pub fn payload_file_count(root: &Path) -> usize {
    fn walk(dir: &Path, count: &mut usize) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, count);
            } else if path.extension().is_some_and(|ext| ext == "knmbbq") {
                *count += 1;
            }
        }
    }
    let mut count = 0;
    walk(root, &mut count);
    count
}

/// Read every payload file under the root, concatenated.
pub fn payload_contents(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, out);
            } else if path.extension().is_some_and(|ext| ext == "knmbbq") {
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    out.push(contents);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}
