//! Timeouts applied to discovery and to individual actions.

use std::time::Duration;

/// How long an SSDP search listens for answers.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for a single action call against a single endpoint.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Options shared by every operation of a [`MappingWrapper`](crate::MappingWrapper).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperOptions {
    pub search_timeout: Duration,
    pub action_timeout: Duration,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        WrapperOptions {
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}
