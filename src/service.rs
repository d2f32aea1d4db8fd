//! IGD service types, port mapping protocols and gateway selection.

use crate::error::{Error, Result};
use futures::StreamExt;
use rupnp::ssdp::{SearchTarget, URN};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

/// URN of the IP-layer connection service.
pub const URN_WAN_IP_CONNECTION_1: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";

/// URN of the PPP-layer connection service.
pub const URN_WAN_PPP_CONNECTION_1: &str = "urn:schemas-upnp-org:service:WANPPPConnection:1";

/// The IGD connection services that expose port mapping actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceTag {
    WanIpConnection1,
    WanPppConnection1,
}

impl ServiceTag {
    /// Service types in the order they are probed.
    ///
    /// Most consumer gateways do NAT at the IP layer, so WANIPConnection comes first.
    pub const PROBE_ORDER: [ServiceTag; 2] =
        [ServiceTag::WanIpConnection1, ServiceTag::WanPppConnection1];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTag::WanIpConnection1 => URN_WAN_IP_CONNECTION_1,
            ServiceTag::WanPppConnection1 => URN_WAN_PPP_CONNECTION_1,
        }
    }

    pub(crate) fn urn(&self) -> URN {
        match self {
            ServiceTag::WanIpConnection1 => URN::service("schemas-upnp-org", "WANIPConnection", 1),
            ServiceTag::WanPppConnection1 => {
                URN::service("schemas-upnp-org", "WANPPPConnection", 1)
            }
        }
    }
}

impl std::fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ServiceTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            URN_WAN_IP_CONNECTION_1 => Ok(ServiceTag::WanIpConnection1),
            URN_WAN_PPP_CONNECTION_1 => Ok(ServiceTag::WanPppConnection1),
            other => Err(Error::UnsupportedTag(other.to_string())),
        }
    }
}

/// Protocol type for port mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    TCP,
    UDP,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::TCP => "TCP",
            Protocol::UDP => "UDP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case-sensitive, like the gateways' own `PortMappingProtocol` values.
impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "TCP" => Ok(Protocol::TCP),
            "UDP" => Ok(Protocol::UDP),
            other => Err(Error::InvalidProtocol(other.to_string())),
        }
    }
}

/// Find the IGD service type available on the local network.
///
/// Each candidate of [`ServiceTag::PROBE_ORDER`] is searched for with SSDP until one
/// of them gets an answer. `None` means no UPnP gateway is reachable, which is an
/// expected outcome on many networks.
pub async fn find_target(search_timeout: Duration) -> Option<ServiceTag> {
    select_target(|tag| probe(tag, search_timeout)).await
}

/// Returns true if a gateway with a supported service type answers discovery.
pub async fn is_available(search_timeout: Duration) -> bool {
    find_target(search_timeout).await.is_some()
}

/// Run `probe` over the candidates in probe order and return the first hit.
///
/// A failed probe counts as a miss for that candidate.
pub async fn select_target<F, Fut>(mut probe: F) -> Option<ServiceTag>
where
    F: FnMut(ServiceTag) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for tag in ServiceTag::PROBE_ORDER {
        match probe(tag).await {
            Ok(true) => {
                tracing::debug!(service = %tag, "gateway service found");
                return Some(tag);
            }
            Ok(false) => tracing::debug!(service = %tag, "no gateway answered"),
            Err(e) => tracing::debug!(service = %tag, error = %e, "discovery probe failed"),
        }
    }
    None
}

/// Search for devices offering `tag` and report whether any responded.
async fn probe(tag: ServiceTag, search_timeout: Duration) -> Result<bool> {
    let search_target = SearchTarget::URN(tag.urn());
    let responses = rupnp::discover(&search_target, search_timeout).await?;
    futures::pin_mut!(responses);
    Ok(responses.next().await.is_some())
}
