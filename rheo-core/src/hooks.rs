// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Side channel for signals that arrive after a terminal.
//!
//! Terminal finality means late values and errors cannot be delivered
//! downstream; well-behaved operators route them here instead. By default
//! they are traced and discarded; a process-wide callback can be installed
//! to observe dropped errors (e.g. in tests or diagnostics).

use parking_lot::RwLock;
use rheo_error::RheoError;
use std::sync::Arc;

type ErrorHook = Arc<dyn Fn(&RheoError) + Send + Sync>;

static ERROR_DROPPED: RwLock<Option<ErrorHook>> = RwLock::new(None);

/// Install (or clear) the process-wide dropped-error callback.
pub fn set_error_dropped_hook(hook: Option<ErrorHook>) {
    *ERROR_DROPPED.write() = hook;
}

/// Report an error that arrived after the stream already terminated.
pub fn error_dropped(error: &RheoError) {
    let hook = ERROR_DROPPED.read().clone();
    match hook {
        Some(hook) => hook(error),
        None => tracing::debug!(%error, "error dropped after terminal"),
    }
}

/// Report a value that arrived after the stream already terminated or was
/// cancelled. The value itself is consumed by the caller.
pub fn next_dropped() {
    tracing::trace!("value dropped after terminal");
}

/// Report a redundant upstream subscription that was cancelled per the
/// at-most-one-subscription rule.
pub fn subscription_dropped() {
    tracing::debug!("redundant subscription cancelled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn installed_hook_observes_dropped_errors() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        set_error_dropped_hook(Some(Arc::new(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        })));

        error_dropped(&RheoError::failed("late"));
        error_dropped(&RheoError::failed("later"));

        set_error_dropped_hook(None);
        error_dropped(&RheoError::failed("unobserved"));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
