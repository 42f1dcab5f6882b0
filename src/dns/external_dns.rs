// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! external-dns providers (NS1 and Route53 backends).
//!
//! These providers never call the edge DNS API themselves. The zone
//! delegation, the per-cluster glue A record and the heartbeat TXT are
//! encoded as endpoints of a dedicated `DNSEndpoint` object in the operator
//! namespace; the external-dns agent running next to the controller routes
//! them to the configured backend. A label on the object carries the backend
//! discriminator so one agent installation can serve either.

use super::{
    ext_ns_server_names, heartbeat_fqdn, heartbeat_timestamp, ns_server_name, DnsProvider,
    ExternalTargets,
};
use crate::assistant::Assistant;
use crate::config::Config;
use crate::constants::{
    EXTDNS_ENDPOINT_NAME, LABEL_DNS_PROVIDER, RECORD_TYPE_NS, RECORD_TYPE_TXT,
};
use crate::crd::{DNSEndpoint, DNSEndpointSpec, Endpoint, Gslb};
use crate::errors::DnsError;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Which external-dns backend materializes the records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternalDnsBackend {
    Ns1,
    Route53,
}

impl ExternalDnsBackend {
    /// The discriminator external-dns is configured to filter on.
    #[must_use]
    pub fn discriminator(self) -> &'static str {
        match self {
            Self::Ns1 => "ns1",
            Self::Route53 => "route53",
        }
    }
}

/// Provider writing delegation state through `DNSEndpoint` objects.
pub struct ExternalDnsProvider {
    backend: ExternalDnsBackend,
    config: Config,
    assistant: Arc<dyn Assistant>,
}

impl ExternalDnsProvider {
    #[must_use]
    pub fn new(
        backend: ExternalDnsBackend,
        config: Config,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        Self {
            backend,
            config,
            assistant,
        }
    }

    /// Addresses the delegated zone's NS name should resolve to: the exposed
    /// CoreDNS when one is published, this cluster's ingress otherwise.
    async fn authoritative_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError> {
        if self.config.coredns_exposed {
            self.assistant.coredns_exposed_ips().await
        } else {
            self.assistant.gslb_ingress_exposed_ips(gslb).await
        }
    }

    /// The delegation object: NS for the zone, glue A for our own NS name,
    /// and our heartbeat TXT.
    fn delegation_endpoint(&self, gslb: &Gslb, ips: Vec<String>, ttl: u32) -> DNSEndpoint {
        let mut ns_targets = vec![ns_server_name(&self.config)];
        ns_targets.extend(ext_ns_server_names(&self.config));

        let mut glue = ips;
        glue.sort();

        let endpoints = vec![
            Endpoint {
                dns_name: self.config.dns_zone.clone(),
                targets: ns_targets,
                record_type: RECORD_TYPE_NS.to_string(),
                record_ttl: Some(i64::from(ttl)),
                labels: None,
                provider_specific: None,
            },
            Endpoint::a_record(&ns_server_name(&self.config), ttl, glue),
            Endpoint {
                dns_name: heartbeat_fqdn(gslb, &self.config, &self.config.cluster_geo_tag),
                targets: vec![heartbeat_timestamp()],
                record_type: RECORD_TYPE_TXT.to_string(),
                record_ttl: Some(i64::from(ttl)),
                labels: None,
                provider_specific: None,
            },
        ];

        DNSEndpoint {
            metadata: ObjectMeta {
                name: Some(EXTDNS_ENDPOINT_NAME.to_string()),
                namespace: Some(self.config.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    LABEL_DNS_PROVIDER.to_string(),
                    self.backend.discriminator().to_string(),
                )])),
                ..ObjectMeta::default()
            },
            spec: DNSEndpointSpec { endpoints },
        }
    }
}

#[async_trait]
impl DnsProvider for ExternalDnsProvider {
    async fn create_zone_delegation_for_external_dns(&self, gslb: &Gslb) -> Result<(), DnsError> {
        let strategy = crate::config::resolve_gslb_strategy(&gslb.spec.strategy, &self.config)?;
        let ips = self.authoritative_ips(gslb).await?;
        let delegation = self.delegation_endpoint(gslb, ips, strategy.dns_ttl_seconds);

        info!(
            zone = %self.config.dns_zone,
            backend = self.backend.discriminator(),
            "Publishing zone delegation through external-dns"
        );
        self.assistant
            .save_dns_endpoint(&self.config.namespace, &delegation)
            .await
    }

    async fn finalize(&self, gslb: &Gslb) -> Result<(), DnsError> {
        info!(gslb = %gslb.name_any(), "Removing external-dns zone delegation");
        self.assistant.remove_endpoint(EXTDNS_ENDPOINT_NAME).await
    }

    async fn get_external_targets(&self, host: &str) -> ExternalTargets {
        let fake = self.config.overrides.fake_dns_enabled;
        let mut by_tag = Vec::new();
        for tag in &self.config.ext_clusters_geo_tags {
            let ns = super::ns_server_name_for_tag(&self.config, tag);
            let targets = self
                .assistant
                .get_external_targets(host, fake, std::slice::from_ref(&ns))
                .await;
            by_tag.push((tag.clone(), targets));
        }
        ExternalTargets(by_tag)
    }

    async fn gslb_ingress_exposed_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError> {
        self.assistant.gslb_ingress_exposed_ips(gslb).await
    }

    async fn save_dns_endpoint(&self, gslb: &Gslb, desired: &DNSEndpoint) -> Result<(), DnsError> {
        self.assistant
            .save_dns_endpoint(&gslb.namespace().unwrap_or_default(), desired)
            .await
    }
}

impl fmt::Display for ExternalDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            ExternalDnsBackend::Ns1 => write!(f, "ExternalDNS-NS1"),
            ExternalDnsBackend::Route53 => write!(f, "ExternalDNS-Route53"),
        }
    }
}

#[cfg(test)]
#[path = "external_dns_tests.rs"]
mod external_dns_tests;
