//! Ctrl-C / SIGTERM handling through the C runtime's `signal`, which both
//! POSIX and the Windows CRT provide.
//!
//! The handler only flips a static flag; a watcher thread forwards it to the
//! operator controls so the sync loop can clear presence before exiting.

use flrp_core::OperatorControls;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WATCH_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(any(unix, windows))]
mod imp {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    static RECEIVED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_signal(_signal: libc::c_int) {
        RECEIVED.store(true, Ordering::SeqCst);
    }

    // The Windows CRT declares SIG_ERR as an int, hence the cast.
    #[allow(clippy::unnecessary_cast)]
    pub fn install() -> io::Result<()> {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        for signal in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: the handler only performs an atomic store.
            if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR as libc::sighandler_t {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    pub fn received() -> bool {
        RECEIVED.load(Ordering::SeqCst)
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use std::io;

    pub fn install() -> io::Result<()> {
        Ok(())
    }

    pub fn received() -> bool {
        false
    }
}

/// Installs the handlers and starts the watcher thread.
pub fn install(controls: Arc<OperatorControls>) {
    if let Err(err) = imp::install() {
        tracing::warn!(error = %err, "Failed to install signal handlers; use `quit` to exit");
        return;
    }

    let spawned = thread::Builder::new()
        .name("signal-watch".to_string())
        .spawn(move || {
            while !controls.shutdown_requested() {
                if imp::received() {
                    tracing::info!("Interrupt received; shutting down");
                    controls.request_shutdown();
                    break;
                }
                thread::sleep(WATCH_INTERVAL);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "Failed to start signal watcher");
    }
}

#[cfg(all(test, any(unix, windows)))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn interrupt_requests_shutdown() {
        let controls = Arc::new(OperatorControls::new());
        install(controls.clone());

        // SAFETY: a handler for SIGINT was installed above.
        assert_eq!(unsafe { libc::raise(libc::SIGINT) }, 0);
        assert!(imp::received());

        let deadline = Instant::now() + Duration::from_secs(2);
        while !controls.shutdown_requested() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(controls.shutdown_requested());
    }
}
