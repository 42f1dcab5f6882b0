// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures and doubles for unit tests.

use crate::assistant::Assistant;
use crate::config::{Config, EdgeDnsKind, InfobloxConfig, LoggerConfig, OverrideConfig};
use crate::crd::{DNSEndpoint, Gslb, GslbSpec, Strategy};
use crate::errors::DnsError;
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// A `Config` for the fake zone setup used throughout the unit tests.
pub fn test_config(cluster_geo_tag: &str, ext_tags: &[&str]) -> Config {
    Config {
        reconcile_requeue_seconds: 30,
        cluster_geo_tag: cluster_geo_tag.to_string(),
        ext_clusters_geo_tags: ext_tags.iter().map(ToString::to_string).collect(),
        edge_dns_kind: EdgeDnsKind::Infoblox,
        edge_dns_server: "127.0.0.1".to_string(),
        edge_dns_zone: "example.com".to_string(),
        dns_zone: "cloud.example.com".to_string(),
        namespace: "gslby".to_string(),
        infoblox: InfobloxConfig::default(),
        overrides: OverrideConfig {
            fake_dns_enabled: false,
            fake_infoblox_enabled: true,
        },
        coredns_exposed: false,
        logger: LoggerConfig::default(),
    }
}

/// A `Gslb` with a single ingress rule for `host` backed by service `app`.
pub fn test_gslb(name: &str, namespace: &str, host: &str, strategy: Strategy) -> Gslb {
    Gslb {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some("b2b7ff55-0000-4000-8000-000000000000".to_string()),
            ..ObjectMeta::default()
        },
        spec: GslbSpec {
            ingress: IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: "app".to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(80),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..IngressSpec::default()
            },
            strategy,
        },
        status: None,
    }
}

/// A failover strategy with explicit defaults, matching the lifecycle tests.
pub fn failover_strategy(primary: &str) -> Strategy {
    Strategy {
        r#type: "failover".to_string(),
        primary_geo_tag: Some(primary.to_string()),
        weight: None,
        split_brain_threshold_seconds: Some(300),
        dns_ttl_seconds: Some(30),
    }
}

/// Scripted assistant double.
///
/// Answers come from fixed tables; every write is recorded for assertions.
#[derive(Default)]
pub struct MockAssistant {
    /// IPs the managed Ingress exposes
    pub ingress_ips: Vec<String>,
    /// IPs the CoreDNS LoadBalancer exposes
    pub coredns_ips: Vec<String>,
    /// Heartbeat freshness per fqdn; absent means expired
    pub heartbeat_fresh: HashMap<String, bool>,
    /// `localtargets` answers per authoritative server name
    pub external: HashMap<String, Vec<String>>,
    /// Recorded `save_dns_endpoint` calls
    pub saved: Mutex<Vec<(String, DNSEndpoint)>>,
    /// Recorded `remove_endpoint` calls
    pub removed: Mutex<Vec<String>>,
}

impl MockAssistant {
    pub fn with_ingress_ips(ips: &[&str]) -> Self {
        Self {
            ingress_ips: ips.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Mark a heartbeat fqdn fresh or expired.
    pub fn set_heartbeat(&mut self, fqdn: &str, fresh: bool) {
        self.heartbeat_fresh.insert(fqdn.to_string(), fresh);
    }

    /// Script the `localtargets` answer of a peer's authoritative server.
    pub fn set_external(&mut self, server: &str, ips: &[&str]) {
        self.external.insert(
            server.to_string(),
            ips.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn saved_specs(&self) -> Vec<DNSEndpoint> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(_, endpoint)| endpoint.clone())
            .collect()
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    async fn coredns_exposed_ips(&self) -> Result<Vec<String>, DnsError> {
        Ok(self.coredns_ips.clone())
    }

    async fn gslb_ingress_exposed_ips(&self, _gslb: &Gslb) -> Result<Vec<String>, DnsError> {
        Ok(self.ingress_ips.clone())
    }

    async fn save_dns_endpoint(
        &self,
        namespace: &str,
        desired: &DNSEndpoint,
    ) -> Result<(), DnsError> {
        self.saved
            .lock()
            .unwrap()
            .push((namespace.to_string(), desired.clone()));
        Ok(())
    }

    async fn remove_endpoint(&self, name: &str) -> Result<(), DnsError> {
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn inspect_txt_threshold(
        &self,
        fqdn: &str,
        _fake_dns: bool,
        _threshold: Duration,
    ) -> Result<(), DnsError> {
        match self.heartbeat_fresh.get(fqdn) {
            Some(true) => Ok(()),
            _ => Err(DnsError::HeartbeatExpired {
                fqdn: fqdn.to_string(),
                detail: "scripted as expired".to_string(),
            }),
        }
    }

    async fn get_external_targets(
        &self,
        _host: &str,
        _fake_dns: bool,
        peer_ns_servers: &[String],
    ) -> Vec<String> {
        let mut targets = Vec::new();
        for server in peer_ns_servers {
            if let Some(ips) = self.external.get(server) {
                targets.extend(ips.iter().cloned());
            }
        }
        targets
    }
}

/// Annotations helper for assertions.
pub fn annotations_of(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.annotations.clone().unwrap_or_default()
}
