// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Infoblox provider: cooperative zone-delegation maintenance.
//!
//! Every cluster is the sole writer of the `delegate_to` entries carrying its
//! own NS name and of its own heartbeat TXT. The update merge therefore
//! replaces only this cluster's entries, preserves peers verbatim, and evicts
//! a peer only when its heartbeat TXT has gone stale. That keeps the
//! delegated zone eventually consistent across independent reconciles
//! without any consensus protocol.

use super::infoblox_api::{FakeInfoblox, InfobloxObjectApi, NameServer, WapiClient, ZoneDelegated};
use super::{
    ext_heartbeat_fqdns, heartbeat_fqdn, heartbeat_timestamp, ns_server_name,
    ns_server_name_for_tag, DnsProvider, ExternalTargets,
};
use crate::assistant::Assistant;
use crate::config::Config;
use crate::crd::{DNSEndpoint, Gslb};
use crate::errors::DnsError;
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Provider writing through the Infoblox WAPI.
pub struct InfobloxProvider {
    config: Config,
    assistant: Arc<dyn Assistant>,
    fake: Arc<FakeInfoblox>,
}

impl InfobloxProvider {
    #[must_use]
    pub fn new(config: Config, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            config,
            assistant,
            fake: Arc::new(FakeInfoblox::new()),
        }
    }

    /// Provider whose object API is a pre-seeded fake, for tests.
    #[must_use]
    pub fn with_fake(config: Config, assistant: Arc<dyn Assistant>, fake: Arc<FakeInfoblox>) -> Self {
        Self {
            config,
            assistant,
            fake,
        }
    }

    /// A fresh connection per call; the WAPI session must not outlive the
    /// reconcile that opened it.
    fn object_api(&self) -> Result<Arc<dyn InfobloxObjectApi>, DnsError> {
        if self.config.overrides.fake_infoblox_enabled {
            Ok(self.fake.clone())
        } else {
            Ok(Arc::new(WapiClient::new(&self.config.infoblox)?))
        }
    }

    fn check_zone_delegated(&self, zone: &ZoneDelegated) -> Result<(), DnsError> {
        if zone.fqdn != self.config.dns_zone {
            return Err(DnsError::ZoneFqdnMismatch {
                expected: self.config.dns_zone.clone(),
                found: zone.fqdn.clone(),
            });
        }
        Ok(())
    }

    /// The delegation entries this cluster owns right now.
    fn own_delegation(&self, addresses: &[String]) -> Vec<NameServer> {
        let mut addresses = addresses.to_vec();
        addresses.sort();
        let name = ns_server_name(&self.config);
        addresses
            .into_iter()
            .map(|address| NameServer {
                address,
                name: name.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl DnsProvider for InfobloxProvider {
    async fn create_zone_delegation_for_external_dns(&self, gslb: &Gslb) -> Result<(), DnsError> {
        let api = self.object_api()?;
        let strategy = crate::config::resolve_gslb_strategy(&gslb.spec.strategy, &self.config)?;
        let addresses = self.assistant.gslb_ingress_exposed_ips(gslb).await?;
        let own = self.own_delegation(&addresses);

        match api.get_zone_delegated(&self.config.dns_zone).await? {
            Some(zone) => {
                self.check_zone_delegated(&zone)?;
                if !zone.ref_.is_empty() {
                    // Replace own entries wholesale; peers stay untouched
                    // unless their heartbeat says they are gone.
                    let mut delegate_to =
                        filter_out_delegate_to(zone.delegate_to, &ns_server_name(&self.config));
                    delegate_to.extend(own.iter().cloned());

                    for (tag, heartbeat) in ext_heartbeat_fqdns(gslb, &self.config) {
                        let fresh = self
                            .assistant
                            .inspect_txt_threshold(
                                &heartbeat,
                                self.config.overrides.fake_dns_enabled,
                                strategy.split_brain_threshold,
                            )
                            .await;
                        if let Err(e) = fresh {
                            warn!(
                                peer = %tag,
                                heartbeat = %heartbeat,
                                error = %e,
                                "External cluster doesn't look alive, filtering it out from delegated zone configuration"
                            );
                            let peer_ns = ns_server_name_for_tag(&self.config, &tag);
                            delegate_to = filter_out_delegate_to(delegate_to, &peer_ns);
                        }
                    }

                    let delegate_to = dedup_name_servers(delegate_to);
                    info!(
                        zone = %self.config.dns_zone,
                        servers = ?delegate_to,
                        "Updating delegated zone"
                    );
                    api.update_zone_delegated(&zone.ref_, &delegate_to).await?;
                }
            }
            None => {
                info!(zone = %self.config.dns_zone, "Creating delegated zone");
                api.create_zone_delegated(&self.config.dns_zone, &own)
                    .await?;
            }
        }

        let heartbeat = heartbeat_fqdn(gslb, &self.config, &self.config.cluster_geo_tag);
        let timestamp = heartbeat_timestamp();
        match api.get_txt_record(&heartbeat).await? {
            None => {
                info!(record = %heartbeat, "Creating split brain TXT record");
                api.create_txt_record(&heartbeat, &timestamp, strategy.dns_ttl_seconds)
                    .await?;
            }
            Some(record) => {
                info!(record = %heartbeat, "Updating split brain TXT record");
                api.update_txt_record(&record.ref_, &timestamp).await?;
            }
        }
        Ok(())
    }

    async fn finalize(&self, gslb: &Gslb) -> Result<(), DnsError> {
        let api = self.object_api()?;

        if let Some(zone) = api.get_zone_delegated(&self.config.dns_zone).await? {
            self.check_zone_delegated(&zone)?;
            if !zone.ref_.is_empty() {
                let remaining =
                    filter_out_delegate_to(zone.delegate_to, &ns_server_name(&self.config));
                if remaining.is_empty() {
                    info!(zone = %self.config.dns_zone, "Deleting delegated zone");
                    api.delete_zone_delegated(&zone.ref_).await?;
                } else {
                    info!(
                        zone = %self.config.dns_zone,
                        "Removing own entries from delegated zone"
                    );
                    api.update_zone_delegated(&zone.ref_, &remaining).await?;
                }
            }
        }

        let heartbeat = heartbeat_fqdn(gslb, &self.config, &self.config.cluster_geo_tag);
        if let Some(record) = api.get_txt_record(&heartbeat).await? {
            if !record.ref_.is_empty() {
                info!(record = %heartbeat, "Deleting split brain TXT record");
                api.delete_txt_record(&record.ref_).await?;
            }
        }
        info!(gslb = %gslb.name_any(), "Finalized Gslb on Infoblox");
        Ok(())
    }

    async fn get_external_targets(&self, host: &str) -> ExternalTargets {
        let fake = self.config.overrides.fake_dns_enabled;
        let mut by_tag = Vec::new();
        for tag in &self.config.ext_clusters_geo_tags {
            let ns = ns_server_name_for_tag(&self.config, tag);
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

impl fmt::Display for InfobloxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Infoblox")
    }
}

/// Drop every entry whose NS name equals `name`, preserving order.
fn filter_out_delegate_to(delegate_to: Vec<NameServer>, name: &str) -> Vec<NameServer> {
    delegate_to
        .into_iter()
        .filter(|entry| entry.name != name)
        .collect()
}

/// Deduplicate on `(address, name)`, first occurrence wins.
fn dedup_name_servers(delegate_to: Vec<NameServer>) -> Vec<NameServer> {
    let mut seen = BTreeSet::new();
    delegate_to
        .into_iter()
        .filter(|entry| seen.insert((entry.address.clone(), entry.name.clone())))
        .collect()
}

#[cfg(test)]
#[path = "infoblox_tests.rs"]
mod infoblox_tests;
