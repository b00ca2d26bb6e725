// Session termination callback

/// Invoked once each time the session becomes unrecoverable
///
/// The client has already cleared the token when this runs. What happens next
/// (redirecting to a login view, prompting, exiting) is up to the application.
pub trait SessionTerminationHook: Send + Sync {
    fn on_session_terminated(&self);
}

impl<F> SessionTerminationHook for F
where
    F: Fn() + Send + Sync,
{
    fn on_session_terminated(&self) {
        self()
    }
}

/// Hook that asks the user to log in again
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTermination;

impl SessionTerminationHook for LogTermination {
    fn on_session_terminated(&self) {
        tracing::warn!("🔒 Session expired, please log in again");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let hook: Box<dyn SessionTerminationHook> = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hook.on_session_terminated();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
