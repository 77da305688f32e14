use std::{future::Future, time::Duration};

use crate::{StoreError, TollbucketError};

/// Await `fut`, failing with [`StoreError::Timeout`] once `timeout` elapses.
///
/// Dropping the inner future cancels the round trip; whether the store applied it
/// is unknown, which is exactly what the timeout error reports.
#[cfg(feature = "redis-tokio")]
pub(crate) async fn with_timeout<F, T>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, TollbucketError>
where
    F: Future<Output = Result<T, TollbucketError>>,
{
    let Some(timeout) = timeout else {
        return fut.await;
    };

    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(StoreError::Timeout(timeout).into()),
    }
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
pub(crate) async fn with_timeout<F, T>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<T, TollbucketError>
where
    F: Future<Output = Result<T, TollbucketError>>,
{
    let Some(timeout) = timeout else {
        return fut.await;
    };

    let expired = async {
        smol::Timer::after(timeout).await;
        Err::<T, TollbucketError>(StoreError::Timeout(timeout).into())
    };

    smol::future::or(fut, expired).await
}
