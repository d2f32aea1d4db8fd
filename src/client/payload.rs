//! SOAP argument payloads and output argument parsing.

use super::{MappingEntry, PortMappingRequest};
use crate::error::ActionError;
use crate::service::Protocol;
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::str::FromStr;

pub(crate) const GET_GENERIC_PORT_MAPPING_ENTRY: &str = "GetGenericPortMappingEntry";
pub(crate) const GET_SPECIFIC_PORT_MAPPING_ENTRY: &str = "GetSpecificPortMappingEntry";
pub(crate) const ADD_PORT_MAPPING: &str = "AddPortMapping";
pub(crate) const DELETE_PORT_MAPPING: &str = "DeletePortMapping";

pub(crate) fn generic_entry_args(index: u16) -> String {
    format!("<NewPortMappingIndex>{index}</NewPortMappingIndex>")
}

pub(crate) fn specific_entry_args(protocol: Protocol, external_port: u16) -> String {
    format!(
        "<NewRemoteHost></NewRemoteHost>\
         <NewExternalPort>{external_port}</NewExternalPort>\
         <NewProtocol>{protocol}</NewProtocol>"
    )
}

pub(crate) fn add_mapping_args(request: &PortMappingRequest) -> String {
    let enabled = if request.enabled { "1" } else { "0" };
    format!(
        "<NewRemoteHost></NewRemoteHost>\
         <NewExternalPort>{}</NewExternalPort>\
         <NewProtocol>{}</NewProtocol>\
         <NewInternalPort>{}</NewInternalPort>\
         <NewInternalClient>{}</NewInternalClient>\
         <NewEnabled>{}</NewEnabled>\
         <NewPortMappingDescription>{}</NewPortMappingDescription>\
         <NewLeaseDuration>{}</NewLeaseDuration>",
        request.external_port,
        request.protocol,
        request.internal_port,
        request.internal_client,
        enabled,
        escape(request.description.as_str()),
        request.lease_duration,
    )
}

pub(crate) fn delete_mapping_args(protocol: Protocol, external_port: u16) -> String {
    format!(
        "<NewRemoteHost></NewRemoteHost>\
         <NewExternalPort>{external_port}</NewExternalPort>\
         <NewProtocol>{protocol}</NewProtocol>"
    )
}

/// Output arguments of one action call.
pub(crate) struct ActionResponse<'a> {
    action: &'static str,
    values: &'a HashMap<String, String>,
}

impl<'a> ActionResponse<'a> {
    pub(crate) fn new(action: &'static str, values: &'a HashMap<String, String>) -> Self {
        ActionResponse { action, values }
    }

    fn required<T: FromStr>(&self, argument: &'static str) -> Result<T, ActionError> {
        let value = self.values.get(argument);
        value
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| ActionError::Malformed {
                action: self.action,
                argument,
                value: value.cloned(),
            })
    }

    fn text(&self, argument: &str) -> String {
        self.values
            .get(argument)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn enabled(&self) -> bool {
        match self.values.get("NewEnabled").map(|v| v.trim()) {
            Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
            None => true,
        }
    }

    fn lease_duration(&self) -> u32 {
        self.values
            .get("NewLeaseDuration")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

pub(crate) fn parse_generic_entry(
    endpoint: &str,
    response: &ActionResponse<'_>,
) -> Result<MappingEntry, ActionError> {
    Ok(MappingEntry {
        endpoint: endpoint.to_string(),
        remote_host: response.text("NewRemoteHost"),
        protocol: response.required("NewProtocol")?,
        external_port: response.required("NewExternalPort")?,
        internal_port: response.required("NewInternalPort")?,
        internal_client: response.required("NewInternalClient")?,
        enabled: response.enabled(),
        description: response.text("NewPortMappingDescription"),
        lease_duration: response.lease_duration(),
    })
}

/// The request already names protocol and external port; the response only carries the rest.
pub(crate) fn parse_specific_entry(
    endpoint: &str,
    protocol: Protocol,
    external_port: u16,
    response: &ActionResponse<'_>,
) -> Result<MappingEntry, ActionError> {
    Ok(MappingEntry {
        endpoint: endpoint.to_string(),
        remote_host: String::new(),
        protocol: protocol.as_str().to_string(),
        external_port,
        internal_port: response.required("NewInternalPort")?,
        internal_client: response.required("NewInternalClient")?,
        enabled: response.enabled(),
        description: response.text("NewPortMappingDescription"),
        lease_duration: response.lease_duration(),
    })
}
