//! Fire-and-forget worker dispatch.
//!
//! Both producers in this crate (the segment loop and the event-listener
//! threads) must never execute external callback code inline: a stalled tap
//! callback gets the tap disabled by the OS, and a stalled segment loop backs
//! the ring buffer up. Side effects are therefore handed to an ephemeral
//! worker thread. Panics inside the dispatched job are caught at this
//! boundary and logged — they never reach the spawning thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tracing::error;

pub(crate) fn spawn_worker<F>(label: &'static str, job: F)
where
    F: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("sotto-{label}"))
        .spawn(move || {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(worker = label, "dispatched callback panicked; fault isolated");
            }
        });

    if let Err(e) = spawned {
        error!(worker = label, "failed to spawn worker thread: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn worker_runs_job() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        spawn_worker("test-ok", move || {
            let _ = tx.send(42);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(42));
    }

    #[test]
    fn worker_panic_does_not_propagate() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        spawn_worker("test-panic", || panic!("intentional test panic"));
        // Spawn a second job after the panicking one to prove dispatch
        // still works and the panic stayed contained.
        spawn_worker("test-after-panic", move || {
            let _ = tx.send(());
        });
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
    }
}
