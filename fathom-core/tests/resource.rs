//! Integration Tests for Resources
//!
//! Synchronous commits, source-driven refetching and race safety.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fathom_core::resource::{Fetch, FetchInfo};
use fathom_core::{effect, resource, BoxError, ResourceOptions, ResourceStatus, Signal};

#[test]
fn sync_fetcher_commits_during_construction() {
    let calls = Arc::new(AtomicI32::new(0));
    let r = {
        let calls = calls.clone();
        resource(ResourceOptions::with_source(
            || true,
            move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Fetch::value(42)
            },
        ))
    };

    assert_eq!(r.state(), ResourceStatus::Ready);
    assert_eq!(r.get(), Some(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

fn delayed_echo(v: u64, _: FetchInfo<u64>) -> Fetch<u64> {
    Fetch::pending(async move {
        let delay = if v == 1 { 20 } else { 5 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, BoxError>(v)
    })
}

#[tokio::test]
async fn slower_latest_fetch_wins() {
    let source = Signal::new(None::<u64>);
    let r = {
        let source = source.clone();
        resource(ResourceOptions::with_source(move || source.get(), delayed_echo))
    };
    assert_eq!(r.state(), ResourceStatus::Unresolved);

    source.set(Some(0));
    source.set(Some(1));
    assert!(r.loading());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(r.get(), Some(1));
}

#[tokio::test]
async fn late_first_result_never_commits() {
    let source = Signal::new(Some(1_u64));
    let commits = Arc::new(AtomicI32::new(0));
    let r = {
        let source = source.clone();
        resource(ResourceOptions::with_source(
            move || source.get(),
            |v: u64, info: FetchInfo<u64>| {
                // ignores its token on purpose
                let _ = info.token;
                Fetch::pending(async move {
                    let delay = if v == 1 { 30 } else { 5 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, BoxError>(v * 100)
                })
            },
        ))
    };

    let seen = {
        let (r, commits) = (r.clone(), commits.clone());
        effect(move || {
            if r.get().is_some() {
                commits.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    source.set(Some(2));
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(r.get(), Some(200));
    assert_eq!(commits.load(Ordering::SeqCst), 1);
    assert_eq!(r.state(), ResourceStatus::Ready);
    seen.dispose();
}

#[tokio::test]
async fn falsy_source_cancels_in_flight_fetch() {
    let source = Signal::new(Some(1_u64));
    let r = {
        let source = source.clone();
        resource(ResourceOptions::with_source(move || source.get(), delayed_echo))
    };
    assert_eq!(r.state(), ResourceStatus::Pending);

    source.set(None);
    assert_eq!(r.state(), ResourceStatus::Unresolved);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(r.state(), ResourceStatus::Unresolved);
    assert_eq!(r.latest(), None);
}

#[tokio::test]
async fn mutate_during_fetch_is_overwritten_by_result() {
    let r = resource(ResourceOptions::new(|_, _| {
        Fetch::pending(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>("fetched".to_string())
        })
    }));
    r.mutate("optimistic".to_string()).unwrap();
    assert_eq!(r.get().as_deref(), Some("optimistic"));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(r.get().as_deref(), Some("fetched"));
}
