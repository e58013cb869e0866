//! Ctrl+C handling.
//!
//! The hook sets a shared `AtomicBool`. The engine checks it before starting
//! each file, so files already being hashed or linked finish and the run
//! then stops with [`RelinkError::Interrupted`](crate::error::RelinkError::Interrupted).
//!
//! ```rust,no_run
//! use relink::signal::install_handler;
//!
//! let handler = install_handler()?;
//! let shutdown_flag = handler.get_flag();
//! # Ok::<(), relink::signal::SignalError>(())
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Interrupt flag shared between the Ctrl+C hook and a run.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Flag for [`Engine::with_shutdown_flag`](crate::engine::Engine::with_shutdown_flag).
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The Ctrl+C hook could not be registered with the OS.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("failed to install Ctrl+C handler: {0}")]
    Install(#[from] ctrlc::Error),
}

static INSTALLED: OnceLock<ShutdownHandler> = OnceLock::new();

/// Register the process-wide Ctrl+C hook and return its flag, cleared.
///
/// The hook is registered once; later calls hand back the same flag after
/// clearing it. If some other code already owns the Ctrl+C hook, the
/// returned flag is never set by a signal.
///
/// # Errors
///
/// Returns [`SignalError::Install`] if the OS rejects the signal hook.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = INSTALLED.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::default();
    let flag = handler.get_flag();
    let hooked = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "\nInterrupted. Finishing in-flight files...");
        let _ = stderr.flush();
        log::info!("Shutdown signal received");
    });

    match hooked {
        Ok(()) => {}
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C already hooked elsewhere, interrupts will not stop the run");
        }
        Err(e) => return Err(e.into()),
    }

    // Another thread may have won the race; use whichever flag got stored.
    let stored = INSTALLED.get_or_init(|| handler);
    stored.reset();
    Ok(stored.clone())
}
