//! Run a test body on its own thread with a deadline, so a hang fails instead of blocking.

#![allow(dead_code)]

use std::time::Duration;

/// Run `f` on a new thread and wait at most `timeout` for its result.
pub fn run_with_timeout<F, T>(timeout: Duration, f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });
    rx.recv_timeout(timeout).map_err(|_| format!("Operation timed out after {timeout:?}"))
}
