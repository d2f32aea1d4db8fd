//! Selection of existing mappings for batch deletion.

use crate::client::MappingEntry;
use crate::service::Protocol;
use std::collections::HashSet;

/// Selects mappings of one protocol by external or internal port.
///
/// An entry matches when its protocol equals the matcher's protocol and its
/// external port is in the external set OR its internal port is in the
/// internal set. With both sets empty nothing matches.
#[derive(Debug, Clone)]
pub struct MappingMatcher {
    protocol: Protocol,
    external_ports: HashSet<u16>,
    internal_ports: HashSet<u16>,
}

impl MappingMatcher {
    pub fn new(protocol: Protocol) -> Self {
        MappingMatcher {
            protocol,
            external_ports: HashSet::new(),
            internal_ports: HashSet::new(),
        }
    }

    pub fn with_external_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.external_ports.extend(ports);
        self
    }

    pub fn with_internal_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.internal_ports.extend(ports);
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Check if this matcher matches the given entry.
    pub fn matches(&self, entry: &MappingEntry) -> bool {
        if entry.protocol != self.protocol.as_str() {
            return false;
        }
        self.external_ports.contains(&entry.external_port)
            || self.internal_ports.contains(&entry.internal_port)
    }

    /// Matching entries, one per [`MappingKey`](crate::MappingKey), in first-seen order.
    pub fn select(&self, entries: &[MappingEntry]) -> Vec<MappingEntry> {
        let mut seen = HashSet::new();
        entries
            .iter()
            .filter(|entry| self.matches(entry))
            .filter(|entry| seen.insert(entry.key()))
            .cloned()
            .collect()
    }
}
