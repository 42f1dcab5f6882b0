// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS assistant: the stateless helper shared by every provider.
//!
//! The assistant talks to the two outside worlds a provider needs:
//!
//! - the Kubernetes API, for the managed Ingress, the CoreDNS LoadBalancer
//!   service and the `DNSEndpoint` objects
//! - the DNS protocol, for resolving LoadBalancer hostnames, reading peer
//!   `localtargets-` records and inspecting heartbeat TXT freshness
//!
//! DNS exchanges go straight to a named server (the edge resolver, or a
//! peer's authoritative NS) rather than through the system resolver, so
//! answers are never satisfied from a stale cache.

use crate::constants::{
    COREDNS_EXT_SERVICE, DNS_EXCHANGE_TIMEOUT_SECS, DNS_PORT, FAKE_DNS_ADDRESS,
    HEARTBEAT_TIMESTAMP_FORMAT, LOCALTARGETS_PREFIX,
};
use crate::crd::{DNSEndpoint, Gslb};
use crate::errors::DnsError;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use hickory_client::client::{AsyncClient, ClientHandle};
use hickory_client::rr::{DNSClass, Name, RData, RecordType};
use hickory_client::udp::UdpClientStream;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// The capability set providers consume. Test doubles substitute an
/// in-memory implementation.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// IPs exposed by the CoreDNS LoadBalancer service.
    async fn coredns_exposed_ips(&self) -> Result<Vec<String>, DnsError>;

    /// IPs exposed by the Gslb's managed Ingress.
    async fn gslb_ingress_exposed_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError>;

    /// Create the `DNSEndpoint`, or update it so its spec equals `desired`'s.
    async fn save_dns_endpoint(&self, namespace: &str, desired: &DNSEndpoint)
        -> Result<(), DnsError>;

    /// Delete the named `DNSEndpoint` from the operator namespace; absent is success.
    async fn remove_endpoint(&self, name: &str) -> Result<(), DnsError>;

    /// Check the freshness of a heartbeat TXT record against `threshold`.
    async fn inspect_txt_threshold(
        &self,
        fqdn: &str,
        fake_dns: bool,
        threshold: Duration,
    ) -> Result<(), DnsError>;

    /// Collect `localtargets-<host>` answers from each peer's authoritative
    /// server. A failing peer contributes nothing; the call never fails.
    async fn get_external_targets(
        &self,
        host: &str,
        fake_dns: bool,
        peer_ns_servers: &[String],
    ) -> Vec<String>;
}

/// Production assistant backed by the cluster API and real DNS exchanges.
pub struct GslbAssistant {
    client: Client,
    namespace: String,
    edge_dns_server: String,
}

impl GslbAssistant {
    /// Create an assistant for the given operator namespace and edge resolver.
    #[must_use]
    pub fn new(client: Client, namespace: &str, edge_dns_server: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            edge_dns_server: edge_dns_server.to_string(),
        }
    }

    fn edge_server(&self, fake_dns: bool) -> String {
        override_with_fake_dns(fake_dns, &self.edge_dns_server)
    }
}

#[async_trait]
impl Assistant for GslbAssistant {
    async fn coredns_exposed_ips(&self) -> Result<Vec<String>, DnsError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let service = api.get(COREDNS_EXT_SERVICE).await.map_err(|e| {
            warn!(service = COREDNS_EXT_SERVICE, "Can't find CoreDNS service");
            DnsError::from(e)
        })?;

        let entry = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|entries| entries.first())
            .cloned()
            .ok_or_else(|| DnsError::CoreDnsNotReady {
                service: COREDNS_EXT_SERVICE.to_string(),
            })?;

        let mut ips = Vec::new();
        if let Some(ip) = entry.ip.filter(|ip| !ip.is_empty()) {
            ips.push(ip);
        }
        if let Some(hostname) = entry.hostname.filter(|h| !h.is_empty()) {
            ips.extend(dig_a(&self.edge_server(false), &hostname).await?);
        }
        Ok(ips)
    }

    async fn gslb_ingress_exposed_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError> {
        let namespace = gslb.namespace().unwrap_or_default();
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &namespace);
        let ingress = api.get(&gslb.name_any()).await.map_err(|e| {
            if matches!(&e, kube::Error::Api(ae) if ae.code == 404) {
                info!(gslb = %gslb.name_any(), "Can't find gslb Ingress");
            }
            DnsError::from(e)
        })?;

        let mut ips = Vec::new();
        let entries = ingress
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            if let Some(ip) = entry.ip.filter(|ip| !ip.is_empty()) {
                ips.push(ip);
            }
            if let Some(hostname) = entry.hostname.filter(|h| !h.is_empty()) {
                ips.extend(dig_a(&self.edge_server(false), &hostname).await?);
            }
        }
        Ok(ips)
    }

    async fn save_dns_endpoint(
        &self,
        namespace: &str,
        desired: &DNSEndpoint,
    ) -> Result<(), DnsError> {
        let api: Api<DNSEndpoint> = Api::namespaced(self.client.clone(), namespace);
        let name = desired.name_any();

        match api.get(&name).await {
            Ok(mut found) => {
                found.spec = desired.spec.clone();
                api.replace(&name, &PostParams::default(), &found).await?;
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                info!(endpoint = %name, namespace, "Creating a new DNSEndpoint");
                match api.create(&PostParams::default(), desired).await {
                    Ok(_) => {}
                    // Lost the create race: somebody wrote it between the get
                    // and the create. Converge by updating what exists.
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {
                        let mut found = api.get(&name).await?;
                        found.spec = desired.spec.clone();
                        api.replace(&name, &PostParams::default(), &found).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn remove_endpoint(&self, name: &str) -> Result<(), DnsError> {
        info!(endpoint = name, namespace = %self.namespace, "Removing endpoint");
        let api: Api<DNSEndpoint> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!(endpoint = name, "Endpoint already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect_txt_threshold(
        &self,
        fqdn: &str,
        fake_dns: bool,
        threshold: Duration,
    ) -> Result<(), DnsError> {
        let server = self.edge_server(fake_dns);
        let response = exchange(&server, fqdn, RecordType::TXT).await?;

        let timestamp = response.iter().find_map(|record| match record.data() {
            Some(RData::TXT(txt)) => txt
                .txt_data()
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        });

        let Some(timestamp) = timestamp else {
            return Err(DnsError::HeartbeatExpired {
                fqdn: fqdn.to_string(),
                detail: format!("no TXT record found at {server}"),
            });
        };

        debug!(fqdn, timestamp, "Heartbeat TXT raw time stamp");
        validate_heartbeat(fqdn, &timestamp, Utc::now().naive_utc(), threshold)
    }

    async fn get_external_targets(
        &self,
        host: &str,
        fake_dns: bool,
        peer_ns_servers: &[String],
    ) -> Vec<String> {
        let fqdn = localtargets_fqdn(host);
        let mut targets = Vec::new();
        for peer in peer_ns_servers {
            let server = override_with_fake_dns(fake_dns, peer);
            match dig_a(&server, &fqdn).await {
                Ok(peer_targets) if !peer_targets.is_empty() => {
                    info!(peer = %peer, targets = ?peer_targets, "Added external Gslb targets");
                    targets.extend(peer_targets);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Contacting external Gslb cluster failed");
                }
            }
        }
        targets
    }
}

/// Compare a heartbeat timestamp literal against the freshness threshold.
fn validate_heartbeat(
    fqdn: &str,
    timestamp: &str,
    now: NaiveDateTime,
    threshold: Duration,
) -> Result<(), DnsError> {
    let parsed = NaiveDateTime::parse_from_str(timestamp, HEARTBEAT_TIMESTAMP_FORMAT).map_err(
        |e| DnsError::HeartbeatExpired {
            fqdn: fqdn.to_string(),
            detail: format!("unparseable timestamp '{timestamp}': {e}"),
        },
    )?;

    let age = now.signed_duration_since(parsed);
    debug!(fqdn, age = %age, "Heartbeat TXT time diff");
    if age.num_seconds() > i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX) {
        return Err(DnsError::HeartbeatExpired {
            fqdn: fqdn.to_string(),
            detail: format!("timestamp older than the {}s threshold", threshold.as_secs()),
        });
    }
    Ok(())
}

/// The `localtargets-<host>.` query name, as a true FQDN.
#[must_use]
pub fn localtargets_fqdn(host: &str) -> String {
    format!("{LOCALTARGETS_PREFIX}-{}.", host.trim_end_matches('.'))
}

/// Substitute the in-process fake DNS server when enabled, otherwise make
/// sure the server address carries a port.
#[must_use]
pub fn override_with_fake_dns(fake_dns: bool, server: &str) -> String {
    if fake_dns {
        FAKE_DNS_ADDRESS.to_string()
    } else {
        with_default_port(server)
    }
}

/// Append `:53` when the address has no explicit port.
fn with_default_port(server: &str) -> String {
    if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{DNS_PORT}")
    }
}

/// Resolve the A records of `host` by asking `server` directly.
///
/// Answers are sorted so callers see a stable order regardless of the
/// rotation the server applies.
pub async fn dig_a(server: &str, host: &str) -> Result<Vec<String>, DnsError> {
    let fqdn = format!("{}.", host.trim_end_matches('.'));
    let response = exchange(server, &fqdn, RecordType::A).await?;
    let mut ips: Vec<String> = response
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(ip)) => Some(ip.to_string()),
            _ => None,
        })
        .collect();
    ips.sort();
    Ok(ips)
}

/// One shot DNS exchange with a specific server, bypassing any resolver cache.
async fn exchange(
    server: &str,
    fqdn: &str,
    record_type: RecordType,
) -> Result<Vec<hickory_client::rr::Record>, DnsError> {
    let server_addr = with_default_port(server);
    let exchange_err = |reason: String| DnsError::Exchange {
        fqdn: fqdn.to_string(),
        server: server_addr.clone(),
        reason,
    };

    let addr: SocketAddr = tokio::net::lookup_host(&server_addr)
        .await
        .map_err(|e| exchange_err(format!("cannot resolve server address: {e}")))?
        .next()
        .ok_or_else(|| exchange_err("server address resolved to nothing".to_string()))?;

    let name = Name::from_ascii(fqdn).map_err(|e| exchange_err(format!("bad query name: {e}")))?;

    let stream = UdpClientStream::<UdpSocket>::with_timeout(
        addr,
        Duration::from_secs(DNS_EXCHANGE_TIMEOUT_SECS),
    );
    let (mut client, background) = AsyncClient::connect(stream)
        .await
        .map_err(|e| exchange_err(e.to_string()))?;
    let background = tokio::spawn(background);

    let result = client
        .query(name, DNSClass::IN, record_type)
        .await
        .map_err(|e| exchange_err(e.to_string()));
    background.abort();

    Ok(result?.answers().to_vec())
}

#[cfg(test)]
#[path = "assistant_tests.rs"]
mod assistant_tests;
