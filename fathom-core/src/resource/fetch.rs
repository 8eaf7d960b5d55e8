//! Fetch Results
//!
//! A fetcher answers either right away ([`Fetch::Ready`]) or with a future
//! ([`Fetch::Pending`]). Ready answers commit inside the batch that started
//! the fetch, so observers never see the loading state in between.

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;

use super::token::CancelToken;
use crate::error::BoxError;

/// What a fetcher returns.
pub enum Fetch<T> {
    Ready(Result<T, BoxError>),
    Pending(BoxFuture<'static, Result<T, BoxError>>),
}

impl<T> Fetch<T> {
    pub fn value(value: T) -> Self {
        Fetch::Ready(Ok(value))
    }

    pub fn error(error: impl Into<BoxError>) -> Self {
        Fetch::Ready(Err(error.into()))
    }

    /// Resolve later. The future is spawned on the current tokio runtime.
    pub fn pending<F, E>(future: F) -> Self
    where
        T: Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Fetch::Pending(Box::pin(async move { future.await.map_err(Into::into) }))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Fetch::Pending(_))
    }
}

impl<T, E: Into<BoxError>> From<Result<T, E>> for Fetch<T> {
    fn from(result: Result<T, E>) -> Self {
        Fetch::Ready(result.map_err(Into::into))
    }
}

impl<T> fmt::Debug for Fetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetch::Ready(Ok(_)) => f.write_str("Fetch::Ready(Ok(..))"),
            Fetch::Ready(Err(error)) => write!(f, "Fetch::Ready(Err({error}))"),
            Fetch::Pending(_) => f.write_str("Fetch::Pending(..)"),
        }
    }
}

/// Context handed to the fetcher alongside the source value.
///
/// `R` is whatever [`Resource::refetch_with`](super::Resource::refetch_with)
/// passes. Fetches it did not request carry `R::from(false)` for the first
/// fetch of an activation and `R::from(true)` afterwards.
#[derive(Debug, Clone)]
pub struct FetchInfo<T, R = bool> {
    /// The last committed value, if any.
    pub previous: Option<T>,
    pub refetching: R,
    /// Cancelled when this fetch is superseded.
    pub token: CancelToken,
}
