//! Resources
//!
//! Asynchronous, source-driven values. A [`Resource`] watches a reactive
//! source, calls its fetcher whenever the source changes to something
//! truthy, and exposes the outcome as a reactive [`ResourceState`].
//!
//! Two layers keep late answers out:
//!
//! - a [`CancelToken`] per fetch, cancelled when the fetch is superseded,
//!   that fetchers may watch to stop early;
//! - an epoch check at commit time that discards any result whose fetch is
//!   no longer the latest, whether or not the fetcher watched its token.

mod fetch;
mod machine;
mod source;
mod state;
mod token;

pub use fetch::{Fetch, FetchInfo};
pub use machine::{resource, Activation, Resource, ResourceObserver, ResourceOptions};
pub use source::ExplicitFalsy;
pub use state::{ResourceState, ResourceStatus};
pub use token::CancelToken;
