//! Operator interrupt handling.
//!
//! A first Ctrl-C requests a graceful stop: the engine finishes the
//! container it is reconciling and aborts before starting the next
//! one, leaving already-validated containers untouched. A second
//! Ctrl-C exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wire SIGINT to the given cancellation flag.
pub fn install_signal_handler(flag: &Arc<AtomicBool>) {
    let flag = Arc::clone(flag);
    let _ = ctrlc::set_handler(move || {
        if flag.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        flag.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current container...");
    });
}
