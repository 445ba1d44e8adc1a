//! # Request Context
//!
//! Cancellation and deadline carrier threaded through every engine call.
//! A context is cheap to clone; clones share the same cancellation state.
//! [`RequestContext::child`] derives a scope that observes its parent but can
//! be cancelled on its own, which is how the engine stops a sibling upstream
//! call once the other one has failed.

use crate::error::{InsightError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Stand-in for "never" when a configured duration does not fit in an
/// [`Instant`]. Thirty years, the same horizon tokio uses for its own
/// far-future timers.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + duration`, saturating to a far-future instant instead of panicking
/// on overflow.
pub(crate) fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Cancelled,
    DeadlineExceeded,
}

impl From<Signal> for InsightError {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Cancelled => InsightError::Cancelled,
            Signal::DeadlineExceeded => InsightError::DeadlineExceeded,
        }
    }
}

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    signal: watch::Sender<Option<Signal>>,
    parent: Option<RequestContext>,
}

/// Cancellation token with an optional deadline
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    fn new(deadline: Option<Instant>, parent: Option<RequestContext>) -> Self {
        let (signal, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                deadline,
                signal,
                parent,
            }),
        }
    }

    /// A context that only ends when cancelled explicitly.
    pub fn background() -> Self {
        Self::new(None, None)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(deadline_after(Instant::now(), timeout))
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new(Some(deadline), None)
    }

    /// Derive a scope that ends when this context ends, or when cancelled
    /// itself. Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self::new(self.deadline(), Some(self.clone()))
    }

    /// Derive a scope with a tighter deadline. The parent's deadline still
    /// applies if it is earlier.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = deadline_after(Instant::now(), timeout);
        let deadline = match self.deadline() {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self::new(Some(deadline), Some(self.clone()))
    }

    /// Effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and every child derived from it. Idempotent.
    pub fn cancel(&self) {
        self.inner.signal.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(Signal::Cancelled);
                true
            } else {
                false
            }
        });
    }

    fn signal(&self) -> Option<Signal> {
        if let Some(signal) = *self.inner.signal.borrow() {
            return Some(signal);
        }
        if let Some(parent) = &self.inner.parent {
            if let Some(signal) = parent.signal() {
                return Some(signal);
            }
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Signal::DeadlineExceeded),
            _ => None,
        }
    }

    /// The reason this context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<InsightError> {
        self.signal().map(InsightError::from)
    }

    pub fn is_done(&self) -> bool {
        self.signal().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub fn done(&self) -> BoxFuture<'_, InsightError> {
        self.wait().map(InsightError::from).boxed()
    }

    fn wait(&self) -> BoxFuture<'_, Signal> {
        async move {
            if let Some(signal) = self.signal() {
                return signal;
            }

            let mut rx = self.inner.signal.subscribe();
            let own = async {
                match rx.wait_for(|s| s.is_some()).await {
                    Ok(signal) => signal.unwrap_or(Signal::Cancelled),
                    // The sender lives in `inner`, which `self` keeps alive.
                    Err(_) => Signal::Cancelled,
                }
            };
            let parent = async {
                match &self.inner.parent {
                    Some(parent) => parent.wait().await,
                    None => futures::future::pending().await,
                }
            };
            let deadline = async {
                match self.inner.deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(deadline).await;
                        Signal::DeadlineExceeded
                    }
                    None => futures::future::pending().await,
                }
            };

            tokio::select! {
                signal = own => signal,
                signal = parent => signal,
                signal = deadline => signal,
            }
        }
        .boxed()
    }

    /// Run `fut` until it completes or this context ends, whichever is first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Sleep for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
