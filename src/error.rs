//! Error types for igd-portmap.

use crate::service::ServiceTag;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for igd-portmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by the UPnP transport.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while discovering gateways or managing mappings.
#[derive(Debug, Error)]
pub enum Error {
    /// No compatible gateway answered discovery.
    #[error("no UPnP internet gateway found")]
    NotFound,

    /// The service type is not one of the supported IGD services.
    #[error("service type {0} is not supported")]
    UnsupportedTag(String),

    /// The service type is supported but no endpoint implements it.
    #[error("no {0} endpoints found")]
    NoEndpoints(ServiceTag),

    /// SSDP discovery failed at the transport level.
    #[error("UPnP discovery failed: {0}")]
    Discovery(#[from] rupnp::Error),

    /// The gateway description could not be fetched in time.
    #[error("gateway did not answer within {0:?}")]
    GatewayTimeout(Duration),

    /// The gateway description URL could not be parsed.
    #[error("invalid gateway URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An action failed on one client of a wrapper.
    #[error("client {index} ({endpoint}): {source}")]
    Client {
        index: usize,
        endpoint: String,
        #[source]
        source: ActionError,
    },

    /// No local interface carries the given name.
    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    /// The interface exists but has no IPv4 address.
    #[error("interface {0} has no IPv4 address")]
    NoIpv4Address(String),

    /// The interface exists but has no IPv6 address.
    #[error("interface {0} has no IPv6 address")]
    NoIpv6Address(String),

    /// Enumerating local interfaces failed.
    #[error("failed to read network interfaces: {0}")]
    Interfaces(#[from] std::io::Error),

    /// Port outside of 1..=65535.
    #[error("invalid port: {0}")]
    InvalidPort(u64),

    /// Protocol other than TCP or UDP.
    #[error("invalid protocol: {0} (expected TCP or UDP)")]
    InvalidProtocol(String),
}

/// Failure of a single action against a single endpoint.
///
/// The gateway's own error codes are not interpreted.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The call did not complete within the action timeout.
    #[error("{action} timed out after {after:?}")]
    Timeout {
        action: &'static str,
        after: Duration,
    },

    /// The endpoint or the transport reported a failure.
    #[error("{action} failed: {source}")]
    Failed {
        action: &'static str,
        #[source]
        source: BoxError,
    },

    /// The endpoint answered, but a required output argument was missing or unparsable.
    #[error("{action} returned malformed {argument}: {value:?}")]
    Malformed {
        action: &'static str,
        argument: &'static str,
        value: Option<String>,
    },
}

impl ActionError {
    pub(crate) fn failed(action: &'static str, source: impl Into<BoxError>) -> Self {
        ActionError::Failed {
            action,
            source: source.into(),
        }
    }

    /// Returns true if the call was cut off by the action timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Timeout { .. })
    }
}

impl Error {
    /// Returns the underlying action error for per-client failures.
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            Error::Client { source, .. } => Some(source),
            _ => None,
        }
    }
}
