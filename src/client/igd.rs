//! SOAP client for WANIPConnection / WANPPPConnection endpoints.

use super::payload::{
    self, ActionResponse, ADD_PORT_MAPPING, DELETE_PORT_MAPPING, GET_GENERIC_PORT_MAPPING_ENTRY,
    GET_SPECIFIC_PORT_MAPPING_ENTRY,
};
use super::{MappingEntry, PortMappingClient, PortMappingRequest};
use crate::error::{ActionError, Error, Result};
use crate::service::{Protocol, ServiceTag};
use async_trait::async_trait;
use futures::StreamExt;
use rupnp::http::Uri;
use rupnp::ssdp::{SearchTarget, URN};
use rupnp::{Device, DeviceSpec, Service};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A port mapping client bound to one service instance of one gateway.
///
/// WANIPConnection and WANPPPConnection share the same port mapping actions,
/// so one type serves both; `tag` records which service it is bound to.
#[derive(Debug, Clone)]
pub struct IgdClient {
    tag: ServiceTag,
    endpoint: String,
    device: Device,
    service: Service,
}

impl IgdClient {
    /// Create a client for every service instance of `tag` in the device tree.
    pub fn from_device(device: &Device, tag: ServiceTag) -> Vec<IgdClient> {
        let urn = tag.urn();
        let mut found = Vec::new();
        collect_services(device, &urn, &mut found);

        found
            .into_iter()
            .map(|(spec, service)| IgdClient {
                tag,
                endpoint: format!("{}/{}", spec.udn(), service.service_id()),
                device: device.clone(),
                service: service.clone(),
            })
            .collect()
    }

    /// The service type this client speaks.
    pub fn tag(&self) -> ServiceTag {
        self.tag
    }

    async fn call(
        &self,
        action: &'static str,
        args: &str,
    ) -> std::result::Result<HashMap<String, String>, ActionError> {
        tracing::trace!(endpoint = %self.endpoint, action, "calling action");
        self.service
            .action(self.device.url(), action, args)
            .await
            .map_err(|e| ActionError::failed(action, e))
    }
}

fn collect_services<'a>(
    spec: &'a DeviceSpec,
    urn: &URN,
    found: &mut Vec<(&'a DeviceSpec, &'a Service)>,
) {
    for service in spec.services() {
        if service.service_type() == urn {
            found.push((spec, service));
        }
    }
    for child in spec.devices() {
        collect_services(child, urn, found);
    }
}

#[async_trait]
impl PortMappingClient for IgdClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn generic_entry(&self, index: u16) -> std::result::Result<MappingEntry, ActionError> {
        let args = payload::generic_entry_args(index);
        let values = self.call(GET_GENERIC_PORT_MAPPING_ENTRY, &args).await?;
        let response = ActionResponse::new(GET_GENERIC_PORT_MAPPING_ENTRY, &values);
        payload::parse_generic_entry(&self.endpoint, &response)
    }

    async fn specific_entry(
        &self,
        protocol: Protocol,
        external_port: u16,
    ) -> std::result::Result<MappingEntry, ActionError> {
        let args = payload::specific_entry_args(protocol, external_port);
        let values = self.call(GET_SPECIFIC_PORT_MAPPING_ENTRY, &args).await?;
        let response = ActionResponse::new(GET_SPECIFIC_PORT_MAPPING_ENTRY, &values);
        payload::parse_specific_entry(&self.endpoint, protocol, external_port, &response)
    }

    async fn add_mapping(
        &self,
        request: &PortMappingRequest,
    ) -> std::result::Result<(), ActionError> {
        let args = payload::add_mapping_args(request);
        self.call(ADD_PORT_MAPPING, &args).await.map(|_| ())
    }

    async fn delete_mapping(
        &self,
        protocol: Protocol,
        external_port: u16,
    ) -> std::result::Result<(), ActionError> {
        let args = payload::delete_mapping_args(protocol, external_port);
        self.call(DELETE_PORT_MAPPING, &args).await.map(|_| ())
    }
}

/// Discover every endpoint on the LAN that implements `tag`.
///
/// Devices whose description cannot be fetched are skipped. An endpoint that
/// answers the search more than once is returned once, in first-answer order.
pub async fn discover_clients(tag: ServiceTag, search_timeout: Duration) -> Result<Vec<IgdClient>> {
    let search_target = SearchTarget::URN(tag.urn());
    let devices = rupnp::discover(&search_target, search_timeout).await?;
    futures::pin_mut!(devices);

    let mut seen = HashSet::new();
    let mut clients = Vec::new();
    while let Some(device) = devices.next().await {
        let device = match device {
            Ok(device) => device,
            Err(e) => {
                tracing::debug!(service = %tag, error = %e, "skipping unreachable device");
                continue;
            }
        };
        for client in IgdClient::from_device(&device, tag) {
            if seen.insert(client.endpoint.clone()) {
                tracing::debug!(
                    endpoint = %client.endpoint,
                    service = %client.tag(),
                    url = %device.url(),
                    "found endpoint"
                );
                clients.push(client);
            }
        }
    }
    Ok(clients)
}

/// Fetch the description of a gateway whose URL is already known.
pub async fn fetch_device(description_url: &str) -> Result<Device> {
    let url: Uri = description_url.parse().map_err(|e| Error::InvalidUrl {
        url: description_url.to_string(),
        reason: format!("{e}"),
    })?;
    Ok(Device::from_url(url).await?)
}
