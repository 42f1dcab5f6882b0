// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the error taxonomy.

use super::*;

#[test]
fn test_config_error_display() {
    let err = ConfigError::inconsistent("DNS_ZONE", "not a subzone of EDGE_DNS_ZONE");

    assert_eq!(
        err.to_string(),
        "invalid configuration (inconsistent) for 'DNS_ZONE': not a subzone of EDGE_DNS_ZONE"
    );
}

#[test]
fn test_config_error_kinds() {
    assert_eq!(ConfigError::missing("F", "d").kind, ConfigErrorKind::Missing);
    assert_eq!(
        ConfigError::malformed("F", "d").kind,
        ConfigErrorKind::Malformed
    );
    assert_eq!(
        ConfigError::inconsistent("F", "d").kind,
        ConfigErrorKind::Inconsistent
    );
}

#[test]
fn test_transient_classification() {
    let exchange = DnsError::Exchange {
        fqdn: "h.example.com".to_string(),
        server: "127.0.0.1:53".to_string(),
        reason: "timeout".to_string(),
    };
    assert!(exchange.is_transient());

    let not_ready = DnsError::CoreDnsNotReady {
        service: "gslby-coredns-lb".to_string(),
    };
    assert!(not_ready.is_transient());

    let server_side = DnsError::WapiStatus {
        path: "zone_delegated".to_string(),
        status: 503,
        body: String::new(),
    };
    assert!(server_side.is_transient());

    let client_side = DnsError::WapiStatus {
        path: "zone_delegated".to_string(),
        status: 400,
        body: String::new(),
    };
    assert!(!client_side.is_transient());

    // A stale heartbeat drives the merge filter, it is not a retryable fault
    let expired = DnsError::HeartbeatExpired {
        fqdn: "g-heartbeat-eu.example.com".to_string(),
        detail: "old".to_string(),
    };
    assert!(!expired.is_transient());

    let mismatch = DnsError::ZoneFqdnMismatch {
        expected: "cloud.example.com".to_string(),
        found: "other.example.com".to_string(),
    };
    assert!(!mismatch.is_transient());
}

#[test]
fn test_status_reasons_are_stable() {
    let expired = DnsError::HeartbeatExpired {
        fqdn: "f".to_string(),
        detail: "d".to_string(),
    };
    assert_eq!(expired.status_reason(), "HeartbeatExpired");

    let mismatch = DnsError::ZoneFqdnMismatch {
        expected: "a".to_string(),
        found: "b".to_string(),
    };
    assert_eq!(mismatch.status_reason(), "ZoneFqdnMismatch");
}
