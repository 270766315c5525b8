//! Helpers shared by the integration tests.
//!
//! The tree reports structural changes through `tracing`. To see them, run the tests with the
//! `RUST_LOG` variable set, for example:
//!
//! ```bash
//! RUST_LOG=contree=trace cargo test --test concurrent -- --nocapture
//! ```

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs the log subscriber.
///
/// Safe to call multiple times, only the first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another test binary in the same process may have won the race, that's fine.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Runs the closure in a separate thread and fails if it doesn't finish in time.
///
/// A hang in these tests means a deadlock, so this turns it into a failure instead of waiting
/// forever.
pub fn within_deadline<F: FnOnce() + Send + 'static>(timeout: Duration, f: F) {
    let (sender, receiver) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        f();
        let _ = sender.send(());
    });
    match receiver.recv_timeout(timeout) {
        Ok(()) => handle.join().unwrap(),
        // The sender was dropped without sending, the closure panicked.
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Operations didn't finish in {:?}, deadlocked?", timeout)
        }
    }
}
