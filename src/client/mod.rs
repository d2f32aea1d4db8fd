//! Port mapping clients: one handle per gateway control endpoint.

mod igd;
mod payload;

pub use igd::*;
pub(crate) use payload::{
    ADD_PORT_MAPPING, DELETE_PORT_MAPPING, GET_GENERIC_PORT_MAPPING_ENTRY,
    GET_SPECIFIC_PORT_MAPPING_ENTRY,
};

use crate::error::ActionError;
use crate::service::Protocol;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Description used when the caller does not supply one.
///
/// Some gateways reject an empty `NewPortMappingDescription`.
pub const DEFAULT_DESCRIPTION: &str = "igd-portmap";

/// The port mapping action set shared by WANIPConnection and WANPPPConnection.
///
/// Every call targets one endpoint. Errors are opaque: a non-`Ok` result means
/// the action failed, nothing more.
#[async_trait]
pub trait PortMappingClient: Send + Sync {
    /// Identifier of the endpoint this client talks to.
    fn endpoint(&self) -> &str;

    /// `GetGenericPortMappingEntry`: the entry at `index` of the mapping table.
    async fn generic_entry(&self, index: u16) -> Result<MappingEntry, ActionError>;

    /// `GetSpecificPortMappingEntry` with a wildcard remote host.
    async fn specific_entry(
        &self,
        protocol: Protocol,
        external_port: u16,
    ) -> Result<MappingEntry, ActionError>;

    /// `AddPortMapping` with a wildcard remote host.
    async fn add_mapping(&self, request: &PortMappingRequest) -> Result<(), ActionError>;

    /// `DeletePortMapping` with a wildcard remote host.
    async fn delete_mapping(&self, protocol: Protocol, external_port: u16)
        -> Result<(), ActionError>;
}

/// One NAT rule as reported by a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Endpoint of the client that reported this entry.
    pub endpoint: String,
    /// Remote host filter; empty for any host.
    pub remote_host: String,
    /// Protocol exactly as the gateway spelled it.
    pub protocol: String,
    pub external_port: u16,
    pub internal_port: u16,
    pub internal_client: String,
    pub enabled: bool,
    pub description: String,
    /// Lease in seconds, 0 for infinite.
    pub lease_duration: u32,
}

/// Identity of a mapping on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub endpoint: String,
    pub protocol: String,
    pub external_port: u16,
}

impl MappingEntry {
    pub fn key(&self) -> MappingKey {
        MappingKey {
            endpoint: self.endpoint.clone(),
            protocol: self.protocol.clone(),
            external_port: self.external_port,
        }
    }
}

impl std::fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}:{}",
            self.protocol, self.external_port, self.internal_client, self.internal_port
        )
    }
}

/// Arguments of an `AddPortMapping` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMappingRequest {
    pub protocol: Protocol,
    pub external_port: u16,
    pub internal_port: u16,
    pub internal_client: Ipv4Addr,
    pub description: String,
    pub enabled: bool,
    /// Lease in seconds, 0 for infinite.
    pub lease_duration: u32,
}

impl PortMappingRequest {
    /// An enabled, never-expiring mapping with the default description.
    pub fn new(
        protocol: Protocol,
        external_port: u16,
        internal_port: u16,
        internal_client: Ipv4Addr,
    ) -> Self {
        PortMappingRequest {
            protocol,
            external_port,
            internal_port,
            internal_client,
            description: DEFAULT_DESCRIPTION.to_string(),
            enabled: true,
            lease_duration: 0,
        }
    }

    /// Set the description. An empty string keeps the default.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.is_empty() {
            self.description = description;
        }
        self
    }
}
