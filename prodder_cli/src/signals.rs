//! Turns SIGINT/SIGTERM into run cancellation.
//!
//! The handlers only flip a static flag, since that is all a signal handler
//! may safely do. A small poller thread forwards the flag to the
//! `CancellationToken`, and the executor kills whatever target is running.

use prodder_core::CancellationToken;
use std::io;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tracing::{debug, info};

#[cfg(unix)]
static CANCEL_FLAG: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Installs the handlers and starts forwarding to `token`.
///
/// On non-unix platforms this does nothing; the console already tears down
/// the child together with us.
#[cfg(unix)]
pub fn install(token: CancellationToken) -> io::Result<()> {
    register_unix_handlers()?;

    std::thread::Builder::new()
        .name("signal-poller".to_string())
        .spawn(move || {
            loop {
                if CANCEL_FLAG.load(Ordering::Relaxed) {
                    info!("Termination signal received, cancelling run");
                    token.cancel();
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install(_token: CancellationToken) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn register_unix_handlers() -> io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn cancel_handler(_: c_int) {
        CANCEL_FLAG.store(true, Ordering::Relaxed);
    }

    let handler = cancel_handler as extern "C" fn(c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an atomic.
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }

    debug!("SIGINT/SIGTERM handlers registered");
    Ok(())
}
