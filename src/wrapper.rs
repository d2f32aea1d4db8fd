//! Fan-out of port mapping operations over every endpoint of a service type.

use crate::client::{
    self, IgdClient, MappingEntry, PortMappingClient, PortMappingRequest, ADD_PORT_MAPPING,
    DELETE_PORT_MAPPING, GET_GENERIC_PORT_MAPPING_ENTRY, GET_SPECIFIC_PORT_MAPPING_ENTRY,
};
use crate::config::WrapperOptions;
use crate::error::{ActionError, Error, Result};
use crate::matcher::MappingMatcher;
use crate::service::{Protocol, ServiceTag};
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A fixed, non-empty set of clients sharing one service type.
///
/// Every operation visits the clients one after another in discovery order.
/// Reads concatenate what each client returns; writes are attempted on every
/// client and report one error per failing client.
pub struct MappingWrapper {
    tag: ServiceTag,
    clients: Vec<Box<dyn PortMappingClient>>,
    options: WrapperOptions,
}

/// Result of deleting one selected mapping in a batch.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub entry: MappingEntry,
    /// One error per client that refused the delete.
    pub errors: Vec<Error>,
}

impl DeleteOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl MappingWrapper {
    /// Discover every endpoint of `tag` with default options.
    pub async fn new(tag: ServiceTag) -> Result<Self> {
        Self::builder().discover(tag).await
    }

    /// Like [`MappingWrapper::new`], for a service type given as a URN string.
    ///
    /// Unsupported URNs fail before any network traffic.
    pub async fn from_urn(urn: &str) -> Result<Self> {
        let tag = urn.parse()?;
        Self::new(tag).await
    }

    /// Create a builder for configuring timeouts and the client source.
    pub fn builder() -> MappingWrapperBuilder {
        MappingWrapperBuilder::default()
    }

    pub fn tag(&self) -> ServiceTag {
        self.tag
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|c| c.endpoint())
    }

    pub fn options(&self) -> WrapperOptions {
        self.options
    }

    /// Walk the mapping table of one client, index 0 upwards.
    ///
    /// The sequence ends at the first failed lookup, which is how gateways
    /// signal the end of the table. Each call starts a fresh walk. An unknown
    /// client index yields nothing.
    pub fn scan(&self, client: usize) -> impl Stream<Item = MappingEntry> + '_ {
        let start = self.clients.get(client).map(|c| (c.as_ref(), 0u16));
        stream::unfold(start, move |state| async move {
            let Some((client, index)) = state else {
                return None;
            };
            let call = client.generic_entry(index);
            match self.bounded(GET_GENERIC_PORT_MAPPING_ENTRY, call).await {
                Ok(entry) => {
                    let next = index.checked_add(1).map(|i| (client, i));
                    Some((entry, next))
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!(endpoint = client.endpoint(), index, error = %e, "mapping scan aborted");
                    None
                }
                Err(e) => {
                    tracing::debug!(endpoint = client.endpoint(), entries = index, reason = %e, "end of mapping table");
                    None
                }
            }
        })
    }

    /// All mappings of all clients, client by client, each in table order.
    ///
    /// The same physical mapping reported by two clients appears twice.
    pub async fn list_all_mappings(&self) -> Vec<MappingEntry> {
        let mut mappings = Vec::with_capacity(8);
        for index in 0..self.clients.len() {
            let entries: Vec<MappingEntry> = self.scan(index).collect().await;
            mappings.extend(entries);
        }
        mappings
    }

    /// Look up `(protocol, port)` for every port on every client.
    ///
    /// Ports without a mapping are skipped; the remaining ports are still queried.
    pub async fn get_specific_mappings(
        &self,
        protocol: Protocol,
        external_ports: &[u16],
    ) -> Vec<MappingEntry> {
        let mut mappings = Vec::with_capacity(external_ports.len());
        for client in &self.clients {
            for &port in external_ports {
                let call = client.specific_entry(protocol, port);
                match self.bounded(GET_SPECIFIC_PORT_MAPPING_ENTRY, call).await {
                    Ok(entry) => mappings.push(entry),
                    Err(e) => tracing::debug!(
                        endpoint = client.endpoint(),
                        %protocol,
                        port,
                        reason = %e,
                        "no specific mapping"
                    ),
                }
            }
        }
        mappings
    }

    /// Add the mapping on every client.
    ///
    /// The mapping is enabled and never expires. An empty description is
    /// replaced by [`DEFAULT_DESCRIPTION`](crate::DEFAULT_DESCRIPTION). The
    /// returned list holds one error per failing client, in client order; it is
    /// empty when every client succeeded.
    pub async fn add_mapping(
        &self,
        protocol: Protocol,
        external_port: u16,
        internal_port: u16,
        internal_client: Ipv4Addr,
        description: &str,
    ) -> Vec<Error> {
        let request = PortMappingRequest::new(protocol, external_port, internal_port, internal_client)
            .with_description(description);

        let mut errors = Vec::with_capacity(self.clients.len());
        for (index, client) in self.clients.iter().enumerate() {
            let result = self.bounded(ADD_PORT_MAPPING, client.add_mapping(&request)).await;
            if let Err(e) = result {
                errors.push(client_error(index, client.as_ref(), e));
            }
        }
        errors
    }

    /// Delete the mapping on every client, collecting per-client errors like
    /// [`MappingWrapper::add_mapping`].
    pub async fn delete_mapping(&self, protocol: Protocol, external_port: u16) -> Vec<Error> {
        let mut errors = Vec::with_capacity(self.clients.len());
        for (index, client) in self.clients.iter().enumerate() {
            let call = client.delete_mapping(protocol, external_port);
            if let Err(e) = self.bounded(DELETE_PORT_MAPPING, call).await {
                errors.push(client_error(index, client.as_ref(), e));
            }
        }
        errors
    }

    /// Delete every existing mapping selected by `matcher`.
    ///
    /// Each selected mapping is deleted once, even if it matched on both
    /// ports. A failed delete does not stop the batch.
    pub async fn delete_matching(&self, matcher: &MappingMatcher) -> Vec<DeleteOutcome> {
        let mappings = self.list_all_mappings().await;
        let selected = matcher.select(&mappings);
        tracing::debug!(listed = mappings.len(), selected = selected.len(), "batch delete");

        let mut outcomes = Vec::with_capacity(selected.len());
        for entry in selected {
            let errors = self
                .delete_mapping(matcher.protocol(), entry.external_port)
                .await;
            outcomes.push(DeleteOutcome { entry, errors });
        }
        outcomes
    }

    async fn bounded<T>(
        &self,
        action: &'static str,
        call: impl Future<Output = std::result::Result<T, ActionError>>,
    ) -> std::result::Result<T, ActionError> {
        let after = self.options.action_timeout;
        tokio::time::timeout(after, call)
            .await
            .unwrap_or_else(|_| Err(ActionError::Timeout { action, after }))
    }
}

fn client_error(index: usize, client: &dyn PortMappingClient, source: ActionError) -> Error {
    tracing::warn!(client = index, endpoint = client.endpoint(), error = %source, "action failed");
    Error::Client {
        index,
        endpoint: client.endpoint().to_string(),
        source,
    }
}

impl std::fmt::Debug for MappingWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingWrapper")
            .field("tag", &self.tag)
            .field("endpoints", &self.endpoints().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for a [`MappingWrapper`].
#[derive(Debug, Default)]
pub struct MappingWrapperBuilder {
    options: WrapperOptions,
}

impl MappingWrapperBuilder {
    /// How long SSDP discovery listens for answers.
    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.options.search_timeout = timeout;
        self
    }

    /// Upper bound for each action call on each client.
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.options.action_timeout = timeout;
        self
    }

    pub fn options(mut self, options: WrapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the wrapper from every endpoint of `tag` found with SSDP.
    pub async fn discover(self, tag: ServiceTag) -> Result<MappingWrapper> {
        let clients = client::discover_clients(tag, self.options.search_timeout).await?;
        self.with_clients(tag, boxed(clients))
    }

    /// Build the wrapper from the gateway at a known description URL.
    pub async fn connect(self, description_url: &str, tag: ServiceTag) -> Result<MappingWrapper> {
        let device = self.fetch(description_url).await?;
        self.with_clients(tag, boxed(IgdClient::from_device(&device, tag)))
    }

    /// Like [`connect`](Self::connect), picking the first service type of
    /// [`ServiceTag::PROBE_ORDER`] the gateway offers.
    ///
    /// The description is fetched once. A gateway offering neither service
    /// type yields [`Error::NotFound`].
    pub async fn connect_any(self, description_url: &str) -> Result<MappingWrapper> {
        let device = self.fetch(description_url).await?;
        for tag in ServiceTag::PROBE_ORDER {
            let clients = IgdClient::from_device(&device, tag);
            if !clients.is_empty() {
                return self.with_clients(tag, boxed(clients));
            }
            tracing::debug!(service = %tag, url = %device.url(), "service not offered");
        }
        Err(Error::NotFound)
    }

    async fn fetch(&self, description_url: &str) -> Result<rupnp::Device> {
        let timeout = self.options.search_timeout;
        tokio::time::timeout(timeout, client::fetch_device(description_url))
            .await
            .map_err(|_| Error::GatewayTimeout(timeout))?
    }

    /// Build the wrapper around caller-supplied clients.
    pub fn with_clients(
        self,
        tag: ServiceTag,
        clients: Vec<Box<dyn PortMappingClient>>,
    ) -> Result<MappingWrapper> {
        if clients.is_empty() {
            return Err(Error::NoEndpoints(tag));
        }
        tracing::debug!(service = %tag, clients = clients.len(), "mapping wrapper ready");
        Ok(MappingWrapper {
            tag,
            clients,
            options: self.options,
        })
    }
}

fn boxed(clients: Vec<IgdClient>) -> Vec<Box<dyn PortMappingClient>> {
    clients
        .into_iter()
        .map(|c| Box::new(c) as Box<dyn PortMappingClient>)
        .collect()
}
