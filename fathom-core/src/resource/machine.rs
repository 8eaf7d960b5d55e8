//! Resource Implementation
//!
//! A [`Resource`] turns a reactive source into a fetch state machine.
//!
//! # How Resources Work
//!
//! 1. The resource keeps an observer [`Effect`] that reads the source (a
//!    [`Memo`] over the user's source function) and a refresh counter.
//!
//! 2. When the observer runs, a falsy source resets the state to
//!    `Unresolved`. A truthy source starts a fetch: the previous token is
//!    cancelled, the epoch is bumped, and the state moves to `Pending` or
//!    `Refreshing`.
//!
//! 3. A ready answer commits in the same batch. A pending answer is spawned
//!    on the ambient tokio runtime, raced against its token.
//!
//! 4. A result commits only if its token is still live and its epoch is
//!    still the current one. Anything else is dropped without touching the
//!    state.
//!
//! # Locking
//!
//! `control` is never held while user code runs. Commits take it inside a
//! batch, so the state write and the epoch check are atomic with respect to
//! other fetches while effects still run after the lock is released.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

use super::fetch::{Fetch, FetchInfo};
use super::source::ExplicitFalsy;
use super::state::{ResourceState, ResourceStatus};
use super::token::CancelToken;
use crate::error::{BoxError, ResourceError};
use crate::reactive::{batch, untracked, Effect, Memo, Signal};

type Fetcher<T, S, R> =
    Arc<dyn Fn(<S as ExplicitFalsy>::Truthy, FetchInfo<T, R>) -> Fetch<T> + Send + Sync>;

/// When a resource starts observing its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// On construction.
    #[default]
    Eager,
    /// On the first read of any projection.
    Lazy,
    /// Only through [`Resource::activate`].
    Manual,
}

/// Construction options for [`Resource`].
pub struct ResourceOptions<T, S = (), R = bool>
where
    S: ExplicitFalsy,
{
    source: Box<dyn Fn() -> S + Send + Sync>,
    fetcher: Fetcher<T, S, R>,
    initial_value: Option<T>,
    activation: Activation,
}

impl<T> ResourceOptions<T, ()> {
    /// A resource without a source. It fetches as soon as it is active.
    pub fn new<F>(fetcher: F) -> Self
    where
        F: Fn((), FetchInfo<T>) -> Fetch<T> + Send + Sync + 'static,
    {
        Self::with_source(|| (), fetcher)
    }
}

impl<T, S> ResourceOptions<T, S, bool>
where
    S: ExplicitFalsy,
{
    /// A resource that fetches whenever `source` changes to a truthy value.
    pub fn with_source<Src, F>(source: Src, fetcher: F) -> Self
    where
        Src: Fn() -> S + Send + Sync + 'static,
        F: Fn(S::Truthy, FetchInfo<T>) -> Fetch<T> + Send + Sync + 'static,
    {
        Self::with_refetch_info(source, fetcher)
    }
}

impl<T, S, R> ResourceOptions<T, S, R>
where
    S: ExplicitFalsy,
{
    /// Like [`with_source`](Self::with_source), with a custom refetch info
    /// type handed through [`Resource::refetch_with`].
    pub fn with_refetch_info<Src, F>(source: Src, fetcher: F) -> Self
    where
        Src: Fn() -> S + Send + Sync + 'static,
        F: Fn(S::Truthy, FetchInfo<T, R>) -> Fetch<T> + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
            fetcher: Arc::new(fetcher),
            initial_value: None,
            activation: Activation::Eager,
        }
    }

    /// Start `Ready` with this value and skip the first fetch.
    pub fn initial_value(mut self, value: T) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn lazy(self) -> Self {
        self.activation(Activation::Lazy)
    }

    pub fn manual(self) -> Self {
        self.activation(Activation::Manual)
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

struct Control<R> {
    /// Bumped by every fetch start, reset, deactivation and disposal.
    epoch: u64,
    /// Token of the latest fetch.
    token: CancelToken,
    observer: Option<Effect>,
    active: bool,
    activation_id: u64,
    /// Lazy resource that has not started yet.
    lazy_armed: bool,
    /// Whether the next fetch is a refetch.
    refetching: bool,
    /// Info from `refetch_with`, handed to the next fetch.
    refetch_info: Option<R>,
    /// Initial value given: the first truthy source does not fetch.
    skip_next: bool,
    disposed: bool,
}

struct ResourceInner<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    state: Signal<ResourceState<T>>,
    source: Memo<S>,
    refresh: Signal<u64>,
    fetcher: Fetcher<T, S, R>,
    activation: Activation,
    control: Mutex<Control<R>>,
}

impl<T, S, R> ResourceInner<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    /// Start observing the source. Returns the activation id, or `None` once
    /// disposed.
    fn start(self: &Arc<Self>) -> Option<u64> {
        let id = {
            let mut control = self.control.lock();
            if control.disposed {
                return None;
            }
            if control.active {
                return Some(control.activation_id);
            }
            control.active = true;
            control.lazy_armed = false;
            control.activation_id += 1;
            control.refetching = false;
            control.activation_id
        };
        tracing::debug!(resource = %self.state.id(), activation = id, "resource activated");

        let weak = Arc::downgrade(self);
        let observer = Effect::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.refresh.get();
            let source = inner.source.get();
            untracked(|| inner.on_source(source, id));
        });

        let stale = {
            let mut control = self.control.lock();
            if control.disposed || !control.active || control.activation_id != id {
                true
            } else {
                control.observer = Some(observer.clone());
                false
            }
        };
        if stale {
            observer.dispose();
        }
        Some(id)
    }

    fn ensure_started(self: &Arc<Self>) {
        let armed = self.control.lock().lazy_armed;
        if armed {
            self.start();
        }
    }

    fn on_source(self: &Arc<Self>, source: S, id: u64) {
        let Some(value) = source.into_truthy() else {
            self.reset(id);
            return;
        };
        {
            let mut control = self.control.lock();
            if !control.is_current(id) {
                return;
            }
            if control.skip_next {
                control.skip_next = false;
                control.refetching = true;
                tracing::trace!(resource = %self.state.id(), "initial value kept, first fetch skipped");
                return;
            }
        }
        self.fetch(value, id);
    }

    fn fetch(self: &Arc<Self>, value: S::Truthy, id: u64) {
        let (epoch, token, refetching, requested) = {
            let mut control = self.control.lock();
            if !control.is_current(id) {
                return;
            }
            control.token.cancel();
            control.epoch += 1;
            control.token = CancelToken::new();
            let refetching = std::mem::replace(&mut control.refetching, true);
            let requested = control.refetch_info.take();
            (control.epoch, control.token.clone(), refetching, requested)
        };
        tracing::debug!(
            resource = %self.state.id(),
            epoch,
            refetching,
            requested = requested.is_some(),
            "fetch started"
        );

        let info = FetchInfo {
            previous: self.state.peek().latest().cloned(),
            refetching: requested.unwrap_or_else(|| R::from(refetching)),
            token: token.clone(),
        };

        batch(|| {
            self.begin_loading();
            match panic::catch_unwind(AssertUnwindSafe(|| (self.fetcher)(value, info))) {
                Ok(Fetch::Ready(result)) => {
                    self.commit(epoch, &token, result.map_err(ResourceError::fetch))
                }
                Ok(Fetch::Pending(future)) => self.spawn(epoch, token, future),
                Err(payload) => self.commit(epoch, &token, Err(ResourceError::from_panic(payload))),
            }
        });
    }

    fn begin_loading(&self) {
        let current = self.state.peek();
        if current.is_loading() {
            return;
        }
        let next = match current {
            ResourceState::Unresolved | ResourceState::Pending => ResourceState::Pending,
            ResourceState::Ready(value) => ResourceState::Refreshing {
                latest: Some(value),
            },
            ResourceState::Refreshing { latest } | ResourceState::Errored { latest, .. } => {
                ResourceState::Refreshing { latest }
            }
        };
        self.state.set(next);
    }

    fn spawn(
        self: &Arc<Self>,
        epoch: u64,
        token: CancelToken,
        future: BoxFuture<'static, Result<T, BoxError>>,
    ) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(resource = %self.state.id(), "fetch returned a future outside a tokio runtime");
            self.commit(epoch, &token, Err(ResourceError::NoRuntime));
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        handle.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                outcome = AssertUnwindSafe(future).catch_unwind() => Some(outcome),
            };
            let Some(outcome) = outcome else {
                tracing::trace!(epoch, "fetch cancelled before completion");
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ResourceError::fetch(error)),
                Err(payload) => Err(ResourceError::from_panic(payload)),
            };
            inner.commit(epoch, &token, result);
        });
    }

    fn commit(&self, epoch: u64, token: &CancelToken, result: Result<T, ResourceError>) {
        batch(|| {
            let control = self.control.lock();
            if token.is_cancelled() || control.epoch != epoch || control.disposed {
                tracing::trace!(resource = %self.state.id(), epoch, current = control.epoch, "discarding superseded fetch result");
                return;
            }
            let next = match result {
                Ok(value) => ResourceState::Ready(value),
                Err(error) => {
                    tracing::debug!(resource = %self.state.id(), epoch, %error, "fetch failed");
                    ResourceState::Errored {
                        error,
                        latest: self.state.peek().latest().cloned(),
                    }
                }
            };
            tracing::debug!(resource = %self.state.id(), epoch, status = %next.status(), "fetch committed");
            self.state.set(next);
        });
    }

    /// No source: cancel whatever is in flight and forget the value.
    fn reset(&self, id: u64) {
        {
            let mut control = self.control.lock();
            if !control.is_current(id) {
                return;
            }
            control.token.cancel();
            control.epoch += 1;
            control.skip_next = false;
            control.refetch_info = None;
        }
        self.set_unresolved();
    }

    fn deactivate(&self, id: u64) {
        let observer = {
            let mut control = self.control.lock();
            if !control.is_current(id) {
                return;
            }
            control.active = false;
            control.token.cancel();
            control.epoch += 1;
            control.refetch_info = None;
            control.observer.take()
        };
        if let Some(observer) = observer {
            observer.dispose();
        }
        tracing::debug!(resource = %self.state.id(), activation = id, "resource deactivated");
        self.set_unresolved();
    }

    fn set_unresolved(&self) {
        if !matches!(self.state.peek(), ResourceState::Unresolved) {
            self.state.set(ResourceState::Unresolved);
        }
    }
}

impl<R> Control<R> {
    fn is_current(&self, id: u64) -> bool {
        !self.disposed && self.active && self.activation_id == id
    }
}

impl<T, S, R> Drop for ResourceInner<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    fn drop(&mut self) {
        let control = self.control.get_mut();
        control.token.cancel();
        if let Some(observer) = control.observer.take() {
            observer.dispose();
        }
    }
}

/// A reactive, cancellable, source-driven fetch.
///
/// All projections are tracked reads, so effects and memos re-run as the
/// state moves.
///
/// # Example
///
/// ```
/// use fathom_core::resource::{resource, Fetch, ResourceOptions, ResourceStatus};
///
/// let answer = resource(ResourceOptions::new(|_, _| Fetch::value(42)));
/// assert_eq!(answer.state(), ResourceStatus::Ready);
/// assert_eq!(answer.get(), Some(42));
/// ```
pub struct Resource<T, S = (), R = bool>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    inner: Arc<ResourceInner<T, S, R>>,
}

impl<T, S, R> Resource<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    pub fn new(options: ResourceOptions<T, S, R>) -> Self {
        let ResourceOptions {
            source,
            fetcher,
            initial_value,
            activation,
        } = options;
        let skip_next = initial_value.is_some();
        let initial = match initial_value {
            Some(value) => ResourceState::Ready(value),
            None => ResourceState::Unresolved,
        };

        let inner = Arc::new(ResourceInner {
            // Every transition is a change; no-op writes are skipped by hand.
            state: Signal::new_with_equals(initial, |_, _| false),
            source: Memo::new(source),
            refresh: Signal::new(0),
            fetcher,
            activation,
            control: Mutex::new(Control {
                epoch: 0,
                token: CancelToken::new(),
                observer: None,
                active: false,
                activation_id: 0,
                lazy_armed: activation == Activation::Lazy,
                refetching: false,
                refetch_info: None,
                skip_next,
                disposed: false,
            }),
        });

        if activation == Activation::Eager {
            inner.start();
        }
        Self { inner }
    }

    /// The current state name.
    pub fn state(&self) -> ResourceStatus {
        self.inner.ensure_started();
        self.inner.state.with(ResourceState::status)
    }

    /// The whole state.
    pub fn snapshot(&self) -> ResourceState<T> {
        self.inner.ensure_started();
        self.inner.state.get()
    }

    /// `true` while `Pending` or `Refreshing`.
    pub fn loading(&self) -> bool {
        self.inner.ensure_started();
        self.inner.state.with(ResourceState::is_loading)
    }

    pub fn error(&self) -> Option<ResourceError> {
        self.inner.ensure_started();
        self.inner.state.with(|state| state.error().cloned())
    }

    /// The last committed value, kept through refreshes and errors.
    pub fn latest(&self) -> Option<T> {
        self.inner.ensure_started();
        self.inner.state.with(|state| state.latest().cloned())
    }

    /// The committed value while `Ready`, `None` otherwise.
    pub fn get(&self) -> Option<T> {
        self.inner.ensure_started();
        self.inner.state.with(|state| state.value().cloned())
    }

    /// Same as [`get`](Self::get).
    pub fn value(&self) -> Option<T> {
        self.get()
    }

    /// Commit a value without calling the fetcher.
    ///
    /// An in-flight fetch is not cancelled and may still overwrite it.
    pub fn mutate(&self, value: T) -> Result<(), ResourceError> {
        if self.is_disposed() {
            return Err(ResourceError::Disposed);
        }
        self.inner.state.set(ResourceState::Ready(value));
        Ok(())
    }

    /// Commit a value computed from the latest one.
    pub fn mutate_with<F>(&self, f: F) -> Result<(), ResourceError>
    where
        F: FnOnce(Option<&T>) -> T,
    {
        if self.is_disposed() {
            return Err(ResourceError::Disposed);
        }
        let current = self.inner.state.peek();
        let next = f(current.latest());
        self.inner.state.set(ResourceState::Ready(next));
        Ok(())
    }

    /// Run the fetcher again for the current source, with `refetching` set.
    pub fn refetch(&self) -> Result<(), ResourceError> {
        self.request_fetch(None)
    }

    /// Run the fetcher again, handing it `info` as `FetchInfo::refetching`.
    ///
    /// An inactive lazy or eager resource starts and its first fetch gets
    /// `info`. If the source is falsy nothing is fetched and `info` is
    /// dropped.
    pub fn refetch_with(&self, info: R) -> Result<(), ResourceError> {
        self.request_fetch(Some(info))
    }

    fn request_fetch(&self, info: Option<R>) -> Result<(), ResourceError> {
        let active = {
            let mut control = self.inner.control.lock();
            if control.disposed {
                return Err(ResourceError::Disposed);
            }
            if !control.active
                && self.inner.activation == Activation::Manual
                && !control.lazy_armed
            {
                return Err(ResourceError::Inactive);
            }
            if info.is_some() {
                control.refetch_info = info;
            }
            control.active
        };
        if !active {
            self.inner.start();
            return Ok(());
        }
        self.inner.refresh.update(|n| n.wrapping_add(1));
        Ok(())
    }

    /// Start observing the source.
    ///
    /// Calling it on an active resource returns a handle to the current
    /// activation without fetching again.
    pub fn activate(&self) -> Result<ResourceObserver<T, S, R>, ResourceError> {
        let id = self.inner.start().ok_or(ResourceError::Disposed)?;
        Ok(ResourceObserver {
            inner: Arc::downgrade(&self.inner),
            id,
        })
    }

    /// Cancel any in-flight fetch and stop observing for good.
    pub fn dispose(&self) {
        let observer = {
            let mut control = self.inner.control.lock();
            if control.disposed {
                return;
            }
            control.disposed = true;
            control.active = false;
            control.token.cancel();
            control.epoch += 1;
            control.observer.take()
        };
        if let Some(observer) = observer {
            observer.dispose();
        }
        tracing::debug!(resource = %self.inner.state.id(), "resource disposed");
    }

    pub fn is_active(&self) -> bool {
        self.inner.control.lock().active
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.control.lock().disposed
    }
}

impl<T, S, R> Clone for Resource<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S, R> fmt::Debug for Resource<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let control = self.inner.control.lock();
        f.debug_struct("Resource")
            .field("id", &self.inner.state.id())
            .field("status", &self.inner.state.peek().status())
            .field("epoch", &control.epoch)
            .field("active", &control.active)
            .field("disposed", &control.disposed)
            .finish()
    }
}

/// Handle returned by [`Resource::activate`].
///
/// Dropping it does nothing; call [`dispose`](Self::dispose) to stop
/// observing.
pub struct ResourceObserver<T, S = (), R = bool>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    inner: Weak<ResourceInner<T, S, R>>,
    id: u64,
}

impl<T, S, R> ResourceObserver<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    /// Stop observing, cancel the in-flight fetch and return to
    /// `Unresolved`. A later activation fetches afresh.
    pub fn dispose(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.deactivate(self.id);
        }
    }
}

impl<T, S, R> fmt::Debug for ResourceObserver<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceObserver")
            .field("activation", &self.id)
            .finish()
    }
}

/// Create a [`Resource`].
pub fn resource<T, S, R>(options: ResourceOptions<T, S, R>) -> Resource<T, S, R>
where
    T: Clone + Send + Sync + 'static,
    S: ExplicitFalsy + Clone + PartialEq + Send + Sync + 'static,
    R: From<bool> + Send + 'static,
{
    Resource::new(options)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Duration;

    fn counting<T: Clone + Send + Sync + 'static>(
        value: T,
    ) -> (Arc<AtomicI32>, impl Fn((), FetchInfo<T>) -> Fetch<T> + Send + Sync + 'static) {
        let calls = Arc::new(AtomicI32::new(0));
        let counter = calls.clone();
        let fetcher = move |_: (), _: FetchInfo<T>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Fetch::value(value.clone())
        };
        (calls, fetcher)
    }

    #[test]
    fn sync_fetcher_is_ready_after_construction() {
        let (calls, fetcher) = counting(42);
        let r = resource(ResourceOptions::new(fetcher));

        assert_eq!(r.state(), ResourceStatus::Ready);
        assert_eq!(r.get(), Some(42));
        assert!(!r.loading());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_resource_waits_for_first_read() {
        let (calls, fetcher) = counting(1);
        let r = resource(ResourceOptions::new(fetcher).lazy());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!r.is_active());

        assert_eq!(r.latest(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        r.get();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initial_value_skips_first_fetch() {
        let (calls, fetcher) = counting(2);
        let r = resource(ResourceOptions::new(fetcher).initial_value(1));

        assert_eq!(r.get(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        r.refetch().unwrap();
        assert_eq!(r.get(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refetch_passes_previous_value_and_flag() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r = {
            let seen = seen.clone();
            resource(ResourceOptions::new(move |_, info: FetchInfo<i32>| {
                seen.lock().push((info.previous, info.refetching));
                Fetch::value(info.previous.unwrap_or(0) + 1)
            }))
        };

        r.refetch().unwrap();
        r.refetch().unwrap();
        assert_eq!(r.get(), Some(3));
        assert_eq!(
            *seen.lock(),
            vec![(None, false), (Some(1), true), (Some(2), true)]
        );
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Reason {
        Initial,
        Revalidate,
        User(&'static str),
    }

    impl From<bool> for Reason {
        fn from(refetching: bool) -> Self {
            if refetching {
                Reason::Revalidate
            } else {
                Reason::Initial
            }
        }
    }

    #[test]
    fn refetch_with_hands_typed_info_to_the_fetcher() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r = {
            let seen = seen.clone();
            resource(ResourceOptions::with_refetch_info(
                || (),
                move |_, info: FetchInfo<i32, Reason>| {
                    seen.lock().push(info.refetching);
                    Fetch::value(info.previous.unwrap_or(0) + 1)
                },
            ))
        };

        r.refetch_with(Reason::User("pull")).unwrap();
        r.refetch().unwrap();
        assert_eq!(r.get(), Some(3));
        assert_eq!(
            *seen.lock(),
            vec![Reason::Initial, Reason::User("pull"), Reason::Revalidate]
        );
    }

    #[test]
    fn refetch_with_starts_a_lazy_resource_with_its_info() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r = {
            let seen = seen.clone();
            resource(
                ResourceOptions::new(move |_, info: FetchInfo<i32>| {
                    seen.lock().push(info.refetching);
                    Fetch::value(1)
                })
                .lazy(),
            )
        };

        r.refetch_with(true).unwrap();
        assert_eq!(r.get(), Some(1));
        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn refetch_info_for_a_falsy_source_is_dropped() {
        let source = Signal::new(None::<i32>);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let r = {
            let (source, seen) = (source.clone(), seen.clone());
            resource(ResourceOptions::with_refetch_info(
                move || source.get(),
                move |v: i32, info: FetchInfo<i32, Reason>| {
                    seen.lock().push(info.refetching);
                    Fetch::value(v)
                },
            ))
        };

        r.refetch_with(Reason::User("early")).unwrap();
        source.set(Some(5));
        assert_eq!(r.get(), Some(5));
        assert_eq!(*seen.lock(), vec![Reason::Initial]);
    }

    #[test]
    fn falsy_source_keeps_resource_unresolved() {
        let source = Signal::new(None::<i32>);
        let calls = Arc::new(AtomicI32::new(0));
        let r = {
            let (source, calls) = (source.clone(), calls.clone());
            resource(ResourceOptions::with_source(
                move || source.get(),
                move |v: i32, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Fetch::value(v * 10)
                },
            ))
        };
        assert_eq!(r.state(), ResourceStatus::Unresolved);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        source.set(Some(0));
        assert_eq!(r.get(), Some(0));

        source.set(Some(4));
        assert_eq!(r.get(), Some(40));

        source.set(None);
        assert_eq!(r.state(), ResourceStatus::Unresolved);
        assert_eq!(r.latest(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fetch_errors_become_state() {
        let fail = Arc::new(AtomicI32::new(1));
        let r = {
            let fail = fail.clone();
            resource(ResourceOptions::new(move |_, _| {
                if fail.load(Ordering::SeqCst) == 1 {
                    Fetch::error("boom")
                } else {
                    Fetch::value(5)
                }
            }))
        };
        assert_eq!(r.state(), ResourceStatus::Errored);
        assert_eq!(r.error().unwrap().to_string(), "fetch failed: boom");
        assert_eq!(r.get(), None);

        fail.store(0, Ordering::SeqCst);
        r.refetch().unwrap();
        assert_eq!(r.get(), Some(5));
        assert!(r.error().is_none());

        fail.store(1, Ordering::SeqCst);
        r.refetch().unwrap();
        assert_eq!(r.state(), ResourceStatus::Errored);
        assert_eq!(r.latest(), Some(5));
    }

    #[test]
    fn fetcher_panics_become_errors() {
        let r: Resource<i32> = resource(ResourceOptions::new(|_, _| panic!("exploded")));
        assert!(matches!(r.error(), Some(ResourceError::Panicked(msg)) if msg == "exploded"));
    }

    #[test]
    fn pending_fetch_without_runtime_errors() {
        let r: Resource<i32> = resource(ResourceOptions::new(|_, _| {
            Fetch::pending(async { Ok::<_, BoxError>(1) })
        }));
        assert!(matches!(r.error(), Some(ResourceError::NoRuntime)));
    }

    #[test]
    fn manual_resource_needs_activation() {
        let (calls, fetcher) = counting(7);
        let r = resource(ResourceOptions::new(fetcher).manual());
        assert_eq!(r.state(), ResourceStatus::Unresolved);
        assert!(matches!(r.refetch(), Err(ResourceError::Inactive)));

        let observer = r.activate().unwrap();
        assert_eq!(r.get(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        observer.dispose();
        assert!(!r.is_active());
        assert_eq!(r.state(), ResourceStatus::Unresolved);

        let again = r.activate().unwrap();
        assert_eq!(r.get(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // a stale observer does not touch the new activation
        observer.dispose();
        assert!(r.is_active());
        again.dispose();
    }

    #[test]
    fn mutate_commits_without_fetching() {
        let (calls, fetcher) = counting(1);
        let r = resource(ResourceOptions::new(fetcher));
        r.mutate(9).unwrap();
        assert_eq!(r.get(), Some(9));
        r.mutate_with(|v| v.copied().unwrap_or(0) + 1).unwrap();
        assert_eq!(r.get(), Some(10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_resource_rejects_actions() {
        let (_, fetcher) = counting(1);
        let r = resource(ResourceOptions::new(fetcher));
        r.dispose();
        r.dispose();
        assert!(r.is_disposed());
        assert!(matches!(r.mutate(2), Err(ResourceError::Disposed)));
        assert!(matches!(r.refetch(), Err(ResourceError::Disposed)));
        assert!(matches!(r.activate(), Err(ResourceError::Disposed)));
        assert_eq!(r.get(), Some(1));
    }

    #[test]
    fn effects_observe_transitions() {
        let (_, fetcher) = counting(3);
        let r = resource(ResourceOptions::new(fetcher));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let fx = {
            let (r, seen) = (r.clone(), seen.clone());
            Effect::new(move || seen.lock().push(r.state()))
        };
        r.mutate(4).unwrap();
        r.refetch().unwrap();

        // sync fetches never show a loading state to observers
        assert!(seen.lock().iter().all(|s| *s == ResourceStatus::Ready));
        assert_eq!(seen.lock().len(), 3);
        fx.dispose();
    }

    #[tokio::test]
    async fn async_fetch_moves_through_loading() {
        let r = resource(ResourceOptions::new(|_, _| {
            Fetch::pending(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, BoxError>(11)
            })
        }));
        assert_eq!(r.state(), ResourceStatus::Pending);
        assert!(r.loading());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.get(), Some(11));

        r.refetch().unwrap();
        assert_eq!(r.state(), ResourceStatus::Refreshing);
        assert_eq!(r.latest(), Some(11));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.state(), ResourceStatus::Ready);
    }

    #[tokio::test]
    async fn async_errors_and_panics_are_errored() {
        let failing: Resource<i32> = resource(ResourceOptions::new(|_, _| {
            Fetch::pending(async { Err::<i32, _>("nope") })
        }));
        let panicking: Resource<i32> = resource(ResourceOptions::new(|_, _| {
            Fetch::pending(async {
                tokio::task::yield_now().await;
                if true {
                    panic!("async boom");
                }
                Ok::<_, BoxError>(0)
            })
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(failing.error().unwrap().to_string(), "fetch failed: nope");
        assert!(matches!(panicking.error(), Some(ResourceError::Panicked(_))));
    }

    #[tokio::test]
    async fn superseded_fetch_is_cancelled_and_discarded() {
        let source = Signal::new(Some(1_u64));
        let r = {
            let source = source.clone();
            resource(ResourceOptions::with_source(
                move || source.get(),
                move |v: u64, info: FetchInfo<u64>| {
                    let token = info.token;
                    Fetch::pending(async move {
                        tokio::select! {
                            _ = token.cancelled() => Err::<u64, BoxError>("aborted".into()),
                            _ = tokio::time::sleep(Duration::from_millis(40 / v)) => Ok(v),
                        }
                    })
                },
            ))
        };

        source.set(Some(2));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(r.get(), Some(2));
        assert!(r.error().is_none());
    }

    #[tokio::test]
    async fn deactivation_drops_in_flight_result() {
        let r = resource(
            ResourceOptions::new(|_, _| {
                Fetch::pending(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, BoxError>(1)
                })
            })
            .manual(),
        );
        let observer = r.activate().unwrap();
        assert_eq!(r.state(), ResourceStatus::Pending);
        observer.dispose();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(r.state(), ResourceStatus::Unresolved);
    }
}
