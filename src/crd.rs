// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for GSLB management.
//!
//! This module defines the Kubernetes Custom Resource Definitions used by gslby
//! to steer global traffic across clusters declaratively.
//!
//! # Resource Types
//!
//! - [`Gslb`] - Declared steering intent: an embedded ingress specification
//!   plus a [`Strategy`] deciding how targets are composed across clusters
//! - [`DNSEndpoint`] - The external-dns resource this controller owns; the
//!   external-dns agent materializes its endpoints at the edge DNS provider
//!
//! # Example: Declaring a failover Gslb
//!
//! ```rust,no_run
//! use gslby::crd::{GslbSpec, Strategy};
//! use k8s_openapi::api::networking::v1::IngressSpec;
//!
//! let spec = GslbSpec {
//!     ingress: IngressSpec::default(),
//!     strategy: Strategy {
//!         r#type: "failover".to_string(),
//!         primary_geo_tag: Some("eu".to_string()),
//!         weight: None,
//!         split_brain_threshold_seconds: None,
//!         dns_ttl_seconds: None,
//!     },
//! };
//! ```

use k8s_openapi::api::networking::v1::IngressSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Traffic-steering strategy for a [`Gslb`].
///
/// The strategy decides how the aggregate A record for each ingress host is
/// composed from the local cluster's targets and the targets learned from
/// external clusters.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// Steering policy. One of `roundRobin`, `weightedRoundRobin`,
    /// `failover`, `geoip`.
    pub r#type: String,

    /// Geo tag of the cluster that answers while healthy.
    /// Required when (and only meaningful when) `type` is `failover`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_geo_tag: Option<String>,

    /// Integer weight per geo tag. Only meaningful for `weightedRoundRobin`;
    /// weights are sum-normalized at use and must cover the local cluster
    /// and every configured external cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<BTreeMap<String, u32>>,

    /// Freshness threshold in seconds for peer heartbeat TXT records.
    /// A peer whose heartbeat is older than this is evicted from the
    /// delegated zone. Defaults to 300.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_brain_threshold_seconds: Option<u32>,

    /// TTL in seconds applied to every emitted DNS record. Defaults to 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_ttl_seconds: Option<u32>,
}

/// `Gslb` declares a hostname to be steered across clusters.
///
/// Each participating cluster runs an instance of this controller and holds
/// an identical `Gslb`. The controller derives a managed Ingress from the
/// embedded spec, observes its LoadBalancer addresses, learns peer targets
/// through DNS, and publishes the steering decision both to the local
/// [`DNSEndpoint`] and to the edge DNS provider.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gslby.firestoned.io",
    version = "v1beta1",
    kind = "Gslb",
    namespaced,
    status = "GslbStatus",
    shortname = "gslb",
    printcolumn = r#"{"name":"Strategy","type":"string","jsonPath":".spec.strategy.type"}"#,
    printcolumn = r#"{"name":"GeoTag","type":"string","jsonPath":".status.geoTag"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GslbSpec {
    /// Ingress specification managed on behalf of this Gslb. The controller
    /// creates and owns an Ingress with this spec in the Gslb's namespace.
    pub ingress: IngressSpec,

    /// How traffic is steered across clusters.
    pub strategy: Strategy,
}

/// Observed state of a [`Gslb`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GslbStatus {
    /// Health of the backend service behind each ingress host:
    /// `Healthy`, `Unhealthy`, or `NotFound`.
    #[serde(default)]
    pub service_health: BTreeMap<String, String>,

    /// The targets currently answered for each ingress host.
    #[serde(default)]
    pub healthy_records: BTreeMap<String, Vec<String>>,

    /// Geo tag of the cluster that produced this status.
    #[serde(default)]
    pub geo_tag: String,
}

/// `DNSEndpoint` is the external-dns contract resource.
///
/// One object per `Gslb`, same name and namespace, owned by it. The
/// external-dns agent watches these objects and writes the listed endpoints
/// to its configured DNS backend.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    /// The DNS records external-dns should materialize.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl PartialEq for DNSEndpointSpec {
    fn eq(&self, other: &Self) -> bool {
        self.endpoints == other.endpoints
    }
}

/// A single DNS record within a [`DNSEndpoint`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// The hostname of the record
    #[serde(default)]
    pub dns_name: String,

    /// The targets the record points to
    #[serde(default)]
    pub targets: Vec<String>,

    /// RR type: `A`, `NS`, `TXT`, ...
    #[serde(default)]
    pub record_type: String,

    /// TTL of the record in seconds
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "recordTTL")]
    pub record_ttl: Option<i64>,

    /// Labels stored with the record by the external-dns registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Provider-specific configuration understood only by a single
    /// external-dns backend (e.g. the geoip steering directive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_specific: Option<Vec<ProviderSpecificProperty>>,
}

/// One provider-specific configuration entry of an [`Endpoint`].
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpecificProperty {
    /// Property name
    pub name: String,
    /// Property value
    pub value: String,
}

impl Endpoint {
    /// Shorthand for an A endpoint with the given name, TTL and targets.
    #[must_use]
    pub fn a_record(dns_name: &str, ttl: u32, targets: Vec<String>) -> Self {
        Self {
            dns_name: dns_name.to_string(),
            targets,
            record_type: crate::constants::RECORD_TYPE_A.to_string(),
            record_ttl: Some(i64::from(ttl)),
            labels: None,
            provider_specific: None,
        }
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
