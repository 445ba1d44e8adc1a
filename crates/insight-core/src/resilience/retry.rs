//! # Retry with exponential backoff
//!
//! Re-runs a fallible async operation under a [`RequestContext`]. The context
//! is checked before every attempt and before every backoff sleep, and the
//! sleep itself ends early when the context does. A fired context always wins
//! over the last operation error.

use crate::context::RequestContext;
use crate::error::Result;
use crate::resilience::RetryPolicy;
use std::future::Future;

impl RetryPolicy {
    /// Run `operation` until it succeeds, the attempts run out, or `ctx` ends.
    ///
    /// When every attempt fails and the context is still live, the last
    /// operation error is returned.
    pub async fn execute<T, F, Fut>(&self, ctx: &RequestContext, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if let Some(cause) = ctx.err() {
                return Err(cause);
            }
            if attempt >= attempts {
                return Err(err);
            }

            let backoff = self.backoff_for(attempt);
            log::debug!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt,
                attempts,
                err,
                backoff
            );
            ctx.sleep(backoff).await?;
            attempt += 1;
        }
    }
}
