//! # igd-portmap
//!
//! Discover UPnP Internet Gateway Devices on the local network and manage their
//! NAT port mappings across every endpoint that answers.
//!
//! ## Example
//!
//! ```no_run
//! use igd_portmap::{find_target, MappingWrapper, Protocol, DEFAULT_SEARCH_TIMEOUT};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> igd_portmap::Result<()> {
//!     let Some(tag) = find_target(DEFAULT_SEARCH_TIMEOUT).await else {
//!         return Err(igd_portmap::Error::NotFound);
//!     };
//!     let wrapper = MappingWrapper::new(tag).await?;
//!
//!     for mapping in wrapper.list_all_mappings().await {
//!         println!("{mapping}");
//!     }
//!
//!     let errors = wrapper
//!         .add_mapping(Protocol::TCP, 8080, 8080, "192.168.1.10".parse().unwrap(), "web")
//!         .await;
//!     if let Some(first) = errors.into_iter().next() {
//!         return Err(first);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod matcher;
pub mod net;
pub mod service;
pub mod wrapper;

// Re-exports for convenience
pub use client::{
    IgdClient, MappingEntry, MappingKey, PortMappingClient, PortMappingRequest,
    DEFAULT_DESCRIPTION,
};
pub use config::{WrapperOptions, DEFAULT_ACTION_TIMEOUT, DEFAULT_SEARCH_TIMEOUT};
pub use error::{ActionError, Error, Result};
pub use matcher::MappingMatcher;
pub use net::{interface_ipv4, interface_ipv6, is_valid_port, parse_port};
pub use service::{find_target, is_available, Protocol, ServiceTag};
pub use wrapper::{DeleteOutcome, MappingWrapper, MappingWrapperBuilder};
