//! Terminal sink for unrecoverable failures.
//!
//! Some failures must never be survived in place: a replica that cannot
//! publish its coordinates after winning the lease, or one that observes
//! evidence of a second master, has to die rather than keep serving.
//! Components report such conditions to a [`Panicker`] instead of
//! propagating them up a call chain that has no good answer.

use std::error::Error;
use std::sync::Mutex;

use tracing::error;

/// Sink for unrecoverable errors. Implementations are expected to
/// terminate the process; callers must not assume control returns.
pub trait Panicker: Send + Sync {
    /// Report a fatal condition.
    fn panic(&self, message: &str, cause: Option<&(dyn Error + 'static)>);
}

/// Production panicker: logs the failure and exits the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExitPanicker;

impl Panicker for ProcessExitPanicker {
    fn panic(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => error!(%cause, "{message}"),
            None => error!("{message}"),
        }
        std::process::exit(1);
    }
}

/// Test panicker that records invocations instead of terminating.
#[derive(Debug, Default)]
pub struct RecordingPanicker {
    calls: Mutex<Vec<String>>,
}

impl RecordingPanicker {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages reported so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("panicker mutex poisoned").clone()
    }
}

impl Panicker for RecordingPanicker {
    fn panic(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        let entry = match cause {
            Some(cause) => format!("{message}: {cause}"),
            None => message.to_string(),
        };
        self.calls.lock().expect("panicker mutex poisoned").push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_panicker_keeps_order() {
        let panicker = RecordingPanicker::new();
        panicker.panic("first", None);
        panicker.panic("second", None);

        assert_eq!(panicker.calls(), vec!["first", "second"]);
    }
}
