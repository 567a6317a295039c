//! Cancellation-aware futures.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Race a future against a [`CancellationToken`].
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// `Ok(output)` if the future completes first, otherwise a
    /// [`Cancelled`](crate::error::ErrorKind::Cancelled) error.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::cancelled()),
            res = self => Ok(res),
        }
    }
}

/// Fail fast at a stage boundary when the token has already fired.
pub fn check(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::cancelled());
    }
    Ok(())
}
