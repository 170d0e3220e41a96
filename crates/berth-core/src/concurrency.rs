use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide "please stop" flag set from the signal handler.
#[derive(Debug, Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark shutdown as requested. Returns `true` if it already was.
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static SHUTDOWN_REQUESTED: ShutdownFlag = ShutdownFlag::new();

/// First Ctrl-C asks the current wait to give up so the container is still
/// released; a second one exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.request() {
            std::process::exit(130);
        }
        eprintln!("\nshutdown requested, releasing container...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.is_requested()
}
