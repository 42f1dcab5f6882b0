// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the gslby operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the Gslb CRD
pub const API_GROUP: &str = "gslby.firestoned.io";

/// API version for the Gslb CRD
pub const API_VERSION: &str = "v1beta1";

/// Kind name for the `Gslb` resource
pub const KIND_GSLB: &str = "Gslb";

/// API group of the external-dns `DNSEndpoint` resource
pub const EXTERNAL_DNS_API_GROUP: &str = "externaldns.k8s.io";

/// Finalizer placed on every `Gslb` managed by this controller
pub const GSLB_FINALIZER: &str = "gslby.firestoned.io/finalizer";

// ============================================================================
// Annotations and Labels
// ============================================================================

/// Annotation carrying the steering strategy type on the managed Ingress
pub const ANNOTATION_STRATEGY: &str = "gslby.firestoned.io/strategy";

/// Annotation carrying the failover primary geo tag on the managed Ingress
pub const ANNOTATION_PRIMARY_GEO_TAG: &str = "gslby.firestoned.io/primary-geotag";

/// Label routing a `DNSEndpoint` to the correct external-dns backend
pub const LABEL_DNS_PROVIDER: &str = "gslby.firestoned.io/dns-provider";

// ============================================================================
// Strategy Type Names
// ============================================================================

/// Round-robin steering: all healthy clusters answer
pub const STRATEGY_ROUND_ROBIN: &str = "roundRobin";

/// Weighted round-robin steering: answers replicated per cluster weight
pub const STRATEGY_WEIGHTED_ROUND_ROBIN: &str = "weightedRoundRobin";

/// Failover steering: primary cluster answers while healthy
pub const STRATEGY_FAILOVER: &str = "failover";

/// Geoip steering: the edge resolver picks the client-closest cluster
pub const STRATEGY_GEOIP: &str = "geoip";

// ============================================================================
// DNS Name Building Blocks
// ============================================================================

/// Prefix of the per-cluster local-targets A record (`localtargets-<host>`)
pub const LOCALTARGETS_PREFIX: &str = "localtargets";

/// Prefix of the per-cluster authoritative NS name
/// (`gslb-ns-<dashed-dns-zone>-<geo-tag>.<edge-dns-zone>`)
pub const NS_RECORD_PREFIX: &str = "gslb-ns";

/// Infix of the heartbeat TXT name (`<gslb>-heartbeat-<geo-tag>.<edge-dns-zone>`)
pub const HEARTBEAT_INFIX: &str = "heartbeat";

/// Timestamp literal format stored in heartbeat TXT records (UTC)
pub const HEARTBEAT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Name of the CoreDNS LoadBalancer service exposing the delegated zone
pub const COREDNS_EXT_SERVICE: &str = "gslby-coredns-lb";

/// Name of the `DNSEndpoint` holding the zone delegation for external-dns providers
pub const EXTDNS_ENDPOINT_NAME: &str = "gslby-ns-extdns";

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port used when a resolver address carries no explicit port
pub const DNS_PORT: u16 = 53;

/// Timeout for a single DNS exchange
pub const DNS_EXCHANGE_TIMEOUT_SECS: u64 = 2;

/// Record type name for A records
pub const RECORD_TYPE_A: &str = "A";

/// Record type name for NS records
pub const RECORD_TYPE_NS: &str = "NS";

/// Record type name for TXT records
pub const RECORD_TYPE_TXT: &str = "TXT";

/// Cap on the total number of replicated targets in a weighted round-robin record
pub const MAX_WEIGHTED_REPLICAS: usize = 255;

/// `providerSpecific` property name carrying the geo tag for geoip steering
pub const PROVIDER_SPECIFIC_GEO_CODE: &str = "geo-code";

// ============================================================================
// Defaults
// ============================================================================

/// Default reconcile requeue interval (seconds)
pub const DEFAULT_RECONCILE_REQUEUE_SECONDS: u64 = 30;

/// Default split-brain TXT freshness threshold (seconds)
pub const DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS: u32 = 300;

/// Default TTL of emitted DNS records (seconds)
pub const DEFAULT_DNS_TTL_SECONDS: u32 = 30;

/// Default Infoblox WAPI request timeout (seconds)
pub const DEFAULT_INFOBLOX_HTTP_TIMEOUT_SECS: u64 = 20;

/// Default Infoblox WAPI connection pool size
pub const DEFAULT_INFOBLOX_POOL_CONNECTIONS: usize = 10;

/// Default Infoblox WAPI version
pub const DEFAULT_INFOBLOX_WAPI_VERSION: &str = "2.4";

/// Default namespace the operator runs in
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "gslby";

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration applied by the error policy (seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Test Shim Constants
// ============================================================================

/// Address of the in-process fake DNS server
pub const FAKE_DNS_ADDRESS: &str = "127.0.0.1:7753";

/// UDP port of the in-process fake DNS server
pub const FAKE_DNS_PORT: u16 = 7753;

/// Zone answered by the fake DNS server
pub const FAKE_DNS_ZONE: &str = "example.com.";

/// Delegated zone FQDN pinned by the fake Infoblox object API
pub const FAKE_INFOBLOX_FQDN: &str = "fakezone.example.com";

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Name of the leadership lease
pub const LEASE_NAME: &str = "gslby-leader";

/// Default leader election lease duration (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election retry period (seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Path of the Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Default bind address of the metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = ":8080";
