//! Resource States
//!
//! ```text
//! Unresolved --fetch--> Pending
//! Pending    --resolve--> Ready
//! Pending    --reject---> Errored
//! Ready      --refetch--> Refreshing
//! Refreshing --resolve--> Ready
//! Refreshing --reject---> Errored
//! Errored    --refetch--> Refreshing
//! any        --no source--> Unresolved
//! ```
//!
//! Each variant carries exactly the data that is meaningful in it. The
//! flags a UI usually wants (`loading`, `latest`, ...) are projections.

use std::fmt;

use serde::Serialize;

use crate::error::ResourceError;

/// The full state of a resource.
#[derive(Debug, Clone)]
pub enum ResourceState<T> {
    /// No source yet, nothing fetched.
    Unresolved,
    /// First fetch in flight.
    Pending,
    /// A value is committed.
    Ready(T),
    /// A later fetch is in flight. `latest` is the last committed value.
    Refreshing { latest: Option<T> },
    /// The last fetch failed.
    Errored {
        error: ResourceError,
        latest: Option<T>,
    },
}

/// The name of a [`ResourceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Unresolved,
    Pending,
    Ready,
    Refreshing,
    Errored,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Unresolved => "unresolved",
            ResourceStatus::Pending => "pending",
            ResourceStatus::Ready => "ready",
            ResourceStatus::Refreshing => "refreshing",
            ResourceStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> ResourceState<T> {
    pub fn status(&self) -> ResourceStatus {
        match self {
            ResourceState::Unresolved => ResourceStatus::Unresolved,
            ResourceState::Pending => ResourceStatus::Pending,
            ResourceState::Ready(_) => ResourceStatus::Ready,
            ResourceState::Refreshing { .. } => ResourceStatus::Refreshing,
            ResourceState::Errored { .. } => ResourceStatus::Errored,
        }
    }

    /// `Pending` or `Refreshing`.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            ResourceState::Pending | ResourceState::Refreshing { .. }
        )
    }

    pub fn error(&self) -> Option<&ResourceError> {
        match self {
            ResourceState::Errored { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The last committed value, kept through refreshes and errors.
    pub fn latest(&self) -> Option<&T> {
        match self {
            ResourceState::Ready(value) => Some(value),
            ResourceState::Refreshing { latest } | ResourceState::Errored { latest, .. } => {
                latest.as_ref()
            }
            ResourceState::Unresolved | ResourceState::Pending => None,
        }
    }

    /// The committed value, only while `Ready`.
    pub fn value(&self) -> Option<&T> {
        match self {
            ResourceState::Ready(value) => Some(value),
            _ => None,
        }
    }
}
