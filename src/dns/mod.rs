// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Edge DNS providers.
//!
//! A provider publishes the steering decision to the authoritative edge DNS.
//! The write semantics differ materially per provider - Infoblox maintains a
//! zone delegation through its object API, the external-dns family encodes
//! the delegation as extra endpoints in a `DNSEndpoint` object - so the
//! shared behavior (reading targets, composing record names) lives in the
//! [`Assistant`](crate::assistant::Assistant) and in this module's name
//! helpers, while each variant implements its own writes.

pub mod external_dns;
pub mod infoblox;
pub mod infoblox_api;
pub mod no_edge;

use crate::assistant::Assistant;
use crate::config::{Config, EdgeDnsKind};
use crate::constants::{HEARTBEAT_INFIX, HEARTBEAT_TIMESTAMP_FORMAT, NS_RECORD_PREFIX};
use crate::crd::{DNSEndpoint, Gslb};
use crate::errors::DnsError;
use async_trait::async_trait;
use chrono::Utc;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;

/// External targets of one host, grouped by the peer cluster they came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalTargets(pub Vec<(String, Vec<String>)>);

impl ExternalTargets {
    /// All targets flattened in configured tag order.
    #[must_use]
    pub fn flatten(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(_, ips)| ips.iter().cloned())
            .collect()
    }
}

/// The capability set every edge DNS provider implements.
#[async_trait]
pub trait DnsProvider: Send + Sync + fmt::Display {
    /// Publish the steering decision: zone delegation plus heartbeat.
    async fn create_zone_delegation_for_external_dns(&self, gslb: &Gslb) -> Result<(), DnsError>;

    /// Remove every record this cluster owns, leaving peer records intact.
    async fn finalize(&self, gslb: &Gslb) -> Result<(), DnsError>;

    /// `localtargets-<host>` answers learned from each healthy peer.
    async fn get_external_targets(&self, host: &str) -> ExternalTargets;

    /// IPs exposed by the Gslb's managed Ingress.
    async fn gslb_ingress_exposed_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError>;

    /// Write the local `DNSEndpoint` object.
    async fn save_dns_endpoint(&self, gslb: &Gslb, desired: &DNSEndpoint) -> Result<(), DnsError>;
}

/// Select the provider for the configured [`EdgeDnsKind`].
#[must_use]
pub fn provider_for(config: Config, assistant: Arc<dyn Assistant>) -> Arc<dyn DnsProvider> {
    match config.edge_dns_kind {
        EdgeDnsKind::Ns1 => Arc::new(external_dns::ExternalDnsProvider::new(
            external_dns::ExternalDnsBackend::Ns1,
            config,
            assistant,
        )),
        EdgeDnsKind::Route53 => Arc::new(external_dns::ExternalDnsProvider::new(
            external_dns::ExternalDnsBackend::Route53,
            config,
            assistant,
        )),
        EdgeDnsKind::Infoblox => Arc::new(infoblox::InfobloxProvider::new(config, assistant)),
        EdgeDnsKind::NoEdge => Arc::new(no_edge::NoEdgeProvider::new(config, assistant)),
    }
}

/// `<dns-zone with dots dashed>`, used inside NS record names.
#[must_use]
pub fn dashed(zone: &str) -> String {
    zone.trim_end_matches('.').replace('.', "-")
}

/// This cluster's authoritative NS name:
/// `gslb-ns-<dashed-dns-zone>-<geo-tag>.<edge-dns-zone>`.
#[must_use]
pub fn ns_server_name(config: &Config) -> String {
    ns_server_name_for_tag(config, &config.cluster_geo_tag)
}

/// A specific cluster's authoritative NS name.
#[must_use]
pub fn ns_server_name_for_tag(config: &Config, geo_tag: &str) -> String {
    format!(
        "{NS_RECORD_PREFIX}-{}-{geo_tag}.{}",
        dashed(&config.dns_zone),
        config.edge_dns_zone
    )
}

/// Authoritative NS names of every external cluster, in configured order.
#[must_use]
pub fn ext_ns_server_names(config: &Config) -> Vec<String> {
    config
        .ext_clusters_geo_tags
        .iter()
        .map(|tag| ns_server_name_for_tag(config, tag))
        .collect()
}

/// The heartbeat TXT name of a cluster:
/// `<gslb-name>-heartbeat-<geo-tag>.<edge-dns-zone>`.
#[must_use]
pub fn heartbeat_fqdn(gslb: &Gslb, config: &Config, geo_tag: &str) -> String {
    format!(
        "{}-{HEARTBEAT_INFIX}-{geo_tag}.{}",
        gslb.name_any(),
        config.edge_dns_zone
    )
}

/// Heartbeat TXT names of every external cluster, paired with their tags.
#[must_use]
pub fn ext_heartbeat_fqdns(gslb: &Gslb, config: &Config) -> Vec<(String, String)> {
    config
        .ext_clusters_geo_tags
        .iter()
        .map(|tag| (tag.clone(), heartbeat_fqdn(gslb, config, tag)))
        .collect()
}

/// The heartbeat timestamp literal for "now", UTC.
#[must_use]
pub fn heartbeat_timestamp() -> String {
    Utc::now().format(HEARTBEAT_TIMESTAMP_FORMAT).to_string()
}
