//! Externally resolvable tri-state completion signals
//!
//! Barrier futures in the switch protocol are resolved by code other than
//! their initializer, and their state must be inspectable synchronously
//! before re-resolving. A bare future cannot do that, so coordination uses
//! [`Signal`]: a oneshot-like latch with a queryable
//! pending/fulfilled/rejected state.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Observable state of a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug)]
struct SignalInner {
    state: SignalState,
    error: Option<Error>,
}

/// A completion signal that can be fulfilled or rejected exactly once from
/// anywhere holding a reference, and awaited any number of times.
#[derive(Debug)]
pub struct Signal {
    inner: Mutex<SignalInner>,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalInner {
                state: SignalState::Pending,
                error: None,
            }),
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> SignalState {
        self.inner.lock().unwrap().state
    }

    pub fn is_settled(&self) -> bool {
        self.state() != SignalState::Pending
    }

    /// Fulfill the signal. Fails with `SignalAlreadySettled` if it was
    /// already fulfilled or rejected.
    pub fn resolve(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != SignalState::Pending {
                return Err(Error::SignalAlreadySettled);
            }
            inner.state = SignalState::Fulfilled;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Reject the signal with `error`. Fails with `SignalAlreadySettled`
    /// if it was already settled.
    pub fn reject(&self, error: Error) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != SignalState::Pending {
                return Err(Error::SignalAlreadySettled);
            }
            inner.state = SignalState::Rejected;
            inner.error = Some(error);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Fulfill the signal if it is still pending; do nothing otherwise.
    ///
    /// Teardown paths use this so destruction always completes no matter
    /// who settled the signal first.
    pub fn settle(&self) {
        let _ = self.resolve();
    }

    /// Wait until the signal settles. Returns the rejection error if it
    /// was rejected; resolves immediately when already settled.
    pub async fn wait(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.inner.lock().unwrap();
                match inner.state {
                    SignalState::Fulfilled => return Ok(()),
                    SignalState::Rejected => {
                        return Err(inner
                            .error
                            .clone()
                            .unwrap_or(Error::SignalAlreadySettled))
                    }
                    SignalState::Pending => {}
                }
            }
            notified.await;
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        assert_eq!(signal.state(), SignalState::Pending);

        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.resolve().unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(signal.state(), SignalState::Fulfilled);
    }

    #[tokio::test]
    async fn test_wait_after_settle_returns_immediately() {
        let signal = Signal::new();
        signal.resolve().unwrap();
        signal.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_surfaces_error() {
        let signal = Signal::new();
        signal.reject(Error::TaskQueueManagerDestroyed).unwrap();
        assert_eq!(signal.state(), SignalState::Rejected);
        assert_eq!(
            signal.wait().await.unwrap_err(),
            Error::TaskQueueManagerDestroyed
        );
    }

    #[test]
    fn test_double_settle_errors_but_defensive_settle_does_not() {
        let signal = Signal::new();
        signal.resolve().unwrap();
        assert_eq!(signal.resolve().unwrap_err(), Error::SignalAlreadySettled);
        assert_eq!(
            signal
                .reject(Error::TaskQueueManagerDestroyed)
                .unwrap_err(),
            Error::SignalAlreadySettled
        );

        // settle() is the idempotent variant used by destroy paths
        signal.settle();
        assert_eq!(signal.state(), SignalState::Fulfilled);
    }
}
