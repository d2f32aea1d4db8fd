//! A minimal UPnP gateway for exercising the SOAP client end to end.
//!
//! Serves a device description and one control endpoint backed by an
//! in-memory port mapping table.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use igd_portmap::ServiceTag;
use quick_xml::escape::{escape, unescape};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, RwLock};

/// A mapping as stored by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMapping {
    pub external_port: u16,
    pub protocol: String,
    pub internal_port: u16,
    pub internal_client: String,
    pub enabled: bool,
    pub description: String,
    pub lease_duration: u32,
}

impl StoredMapping {
    pub fn new(protocol: &str, external_port: u16, internal_port: u16, internal_client: &str) -> Self {
        StoredMapping {
            external_port,
            protocol: protocol.to_string(),
            internal_port,
            internal_client: internal_client.to_string(),
            enabled: true,
            description: "seeded".to_string(),
            lease_duration: 0,
        }
    }
}

struct GatewayState {
    tag: ServiceTag,
    table: RwLock<Vec<StoredMapping>>,
}

/// A running gateway; stops when dropped.
pub struct FakeGateway {
    addr: SocketAddr,
    state: Arc<GatewayState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FakeGateway {
    /// Start a gateway offering `tag` on a random local port.
    pub async fn start(tag: ServiceTag) -> Self {
        let state = Arc::new(GatewayState {
            tag,
            table: RwLock::new(Vec::new()),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/rootDesc.xml", get(handle_root_desc))
            .route(control_path(tag), post(handle_soap_action))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        FakeGateway {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn description_url(&self) -> String {
        format!("http://{}/rootDesc.xml", self.addr)
    }

    pub async fn insert(&self, mapping: StoredMapping) {
        self.state.table.write().await.push(mapping);
    }

    pub async fn mappings(&self) -> Vec<StoredMapping> {
        self.state.table.read().await.clone()
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn control_path(tag: ServiceTag) -> &'static str {
    match tag {
        ServiceTag::WanIpConnection1 => "/ctl/IPConn",
        ServiceTag::WanPppConnection1 => "/ctl/PPPConn",
    }
}

fn service_id(tag: ServiceTag) -> &'static str {
    match tag {
        ServiceTag::WanIpConnection1 => "urn:upnp-org:serviceId:WANIPConn1",
        ServiceTag::WanPppConnection1 => "urn:upnp-org:serviceId:WANPPPConn1",
    }
}

fn xml_response(status: StatusCode, xml: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
        .body(Body::from(xml))
        .unwrap()
}

async fn handle_root_desc(State(state): State<Arc<GatewayState>>) -> Response<Body> {
    let tag = state.tag;
    let xml = format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName>Test Gateway</friendlyName>
    <manufacturer>igd-portmap</manufacturer>
    <modelName>Test Internet Gateway Device</modelName>
    <UDN>uuid:test-gateway-001</UDN>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <friendlyName>WANDevice</friendlyName>
        <manufacturer>igd-portmap</manufacturer>
        <modelName>WANDevice</modelName>
        <UDN>uuid:test-gateway-wan-001</UDN>
        <deviceList>
          <device>
            <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
            <friendlyName>WANConnectionDevice</friendlyName>
            <manufacturer>igd-portmap</manufacturer>
            <modelName>WANConnectionDevice</modelName>
            <UDN>uuid:test-gateway-wanconn-001</UDN>
            <serviceList>
              <service>
                <serviceType>{tag}</serviceType>
                <serviceId>{service_id}</serviceId>
                <SCPDURL>/scpd.xml</SCPDURL>
                <controlURL>{control}</controlURL>
                <eventSubURL>/evt/conn</eventSubURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#,
        service_id = service_id(tag),
        control = control_path(tag),
    );
    xml_response(StatusCode::OK, xml)
}

async fn handle_soap_action(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: String,
) -> Response<Body> {
    // Format: "urn:schemas-upnp-org:service:WANIPConnection:1#AddPortMapping"
    let soap_action = headers
        .get("SOAPACTION")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let action = soap_action
        .trim_matches('"')
        .rsplit('#')
        .next()
        .unwrap_or("")
        .to_string();

    let result = match action.as_str() {
        "GetGenericPortMappingEntry" => get_generic(&state, &body).await,
        "GetSpecificPortMappingEntry" => get_specific(&state, &body).await,
        "AddPortMapping" => add(&state, &body).await,
        "DeletePortMapping" => delete(&state, &body).await,
        _ => Err((401, "Invalid Action")),
    };

    match result {
        Ok(arguments) => xml_response(
            StatusCode::OK,
            success_envelope(state.tag, &action, &arguments),
        ),
        Err((code, description)) => xml_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            fault_envelope(code, description),
        ),
    }
}

type ActionResult = Result<Vec<(&'static str, String)>, (u16, &'static str)>;

async fn get_generic(state: &GatewayState, body: &str) -> ActionResult {
    let index: usize = xml_value(body, "NewPortMappingIndex")
        .and_then(|s| s.parse().ok())
        .ok_or((402, "Invalid Args"))?;
    let table = state.table.read().await;
    let mapping = table.get(index).ok_or((713, "SpecifiedArrayIndexInvalid"))?;
    let mut arguments = vec![
        ("NewExternalPort", mapping.external_port.to_string()),
        ("NewProtocol", mapping.protocol.clone()),
    ];
    arguments.extend(entry_arguments(mapping));
    Ok(arguments)
}

async fn get_specific(state: &GatewayState, body: &str) -> ActionResult {
    let (protocol, external_port) = mapping_key(body)?;
    let table = state.table.read().await;
    let mapping = table
        .iter()
        .find(|m| m.protocol == protocol && m.external_port == external_port)
        .ok_or((714, "NoSuchEntryInArray"))?;
    Ok(entry_arguments(mapping))
}

async fn add(state: &GatewayState, body: &str) -> ActionResult {
    let (protocol, external_port) = mapping_key(body)?;
    let mapping = StoredMapping {
        external_port,
        protocol,
        internal_port: xml_value(body, "NewInternalPort")
            .and_then(|s| s.parse().ok())
            .ok_or((402, "Invalid Args"))?,
        internal_client: xml_value(body, "NewInternalClient").unwrap_or_default(),
        enabled: xml_value(body, "NewEnabled").is_some_and(|s| s == "1"),
        description: xml_value(body, "NewPortMappingDescription")
            .and_then(|s| unescape(&s).ok().map(|s| s.into_owned()))
            .unwrap_or_default(),
        lease_duration: xml_value(body, "NewLeaseDuration")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    };

    let mut table = state.table.write().await;
    match table
        .iter_mut()
        .find(|m| m.protocol == mapping.protocol && m.external_port == mapping.external_port)
    {
        Some(existing) if existing.internal_client != mapping.internal_client => {
            Err((718, "ConflictInMappingEntry"))
        }
        Some(existing) => {
            *existing = mapping;
            Ok(Vec::new())
        }
        None => {
            table.push(mapping);
            Ok(Vec::new())
        }
    }
}

async fn delete(state: &GatewayState, body: &str) -> ActionResult {
    let (protocol, external_port) = mapping_key(body)?;
    let mut table = state.table.write().await;
    let position = table
        .iter()
        .position(|m| m.protocol == protocol && m.external_port == external_port)
        .ok_or((714, "NoSuchEntryInArray"))?;
    table.remove(position);
    Ok(Vec::new())
}

fn mapping_key(body: &str) -> Result<(String, u16), (u16, &'static str)> {
    let protocol = xml_value(body, "NewProtocol").ok_or((402, "Invalid Args"))?;
    let external_port = xml_value(body, "NewExternalPort")
        .and_then(|s| s.parse().ok())
        .ok_or((402, "Invalid Args"))?;
    Ok((protocol, external_port))
}

/// Output arguments shared by both entry lookups. Empty values are left out.
fn entry_arguments(mapping: &StoredMapping) -> Vec<(&'static str, String)> {
    vec![
        ("NewInternalPort", mapping.internal_port.to_string()),
        ("NewInternalClient", mapping.internal_client.clone()),
        ("NewEnabled", if mapping.enabled { "1" } else { "0" }.to_string()),
        ("NewPortMappingDescription", escape(mapping.description.as_str()).into_owned()),
        ("NewLeaseDuration", mapping.lease_duration.to_string()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .collect()
}

/// Extract a value from XML by tag name (simple implementation).
fn xml_value(body: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}", tag);
    let end_tag = format!("</{}>", tag);

    let start = body.find(&start_tag)?;
    let after_start = &body[start..];
    let tag_end = after_start.find('>')?;
    let content_start = start + tag_end + 1;

    let end = body[content_start..].find(&end_tag)?;
    Some(body[content_start..content_start + end].trim().to_string())
}

fn success_envelope(tag: ServiceTag, action: &str, arguments: &[(&'static str, String)]) -> String {
    let arguments: String = arguments
        .iter()
        .map(|(name, value)| format!("<{name}>{value}</{name}>\n"))
        .collect();
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<u:{action}Response xmlns:u="{tag}">
{arguments}</u:{action}Response>
</s:Body>
</s:Envelope>"#
    )
}

fn fault_envelope(code: u16, description: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError</faultstring>
<detail>
<UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
<errorCode>{code}</errorCode>
<errorDescription>{description}</errorDescription>
</UPnPError>
</detail>
</s:Fault>
</s:Body>
</s:Envelope>"#
    )
}
