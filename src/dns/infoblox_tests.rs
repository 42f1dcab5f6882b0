// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the Infoblox delegated-zone merge.

use super::super::infoblox_api::{FakeInfoblox, NameServer};
use super::*;
use crate::constants::HEARTBEAT_TIMESTAMP_FORMAT;
use crate::crd::Gslb;
use crate::test_support::{failover_strategy, test_config, test_gslb, MockAssistant};
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;

fn entry(address: &str, name: &str) -> NameServer {
    NameServer {
        address: address.to_string(),
        name: name.to_string(),
    }
}

fn gslb() -> Gslb {
    test_gslb(
        "test-gslb",
        "test",
        "app.cloud.example.com",
        failover_strategy("eu"),
    )
}

/// Provider over a pre-seeded fake zone with a scripted assistant.
fn provider_with(
    cluster: &str,
    ext: &[&str],
    seeded: Vec<NameServer>,
    assistant: MockAssistant,
) -> (InfobloxProvider, Arc<FakeInfoblox>) {
    let config = test_config(cluster, ext);
    let fake = Arc::new(FakeInfoblox::with_zone(&config.dns_zone, seeded));
    let provider = InfobloxProvider::with_fake(config, Arc::new(assistant), fake.clone());
    (provider, fake)
}

#[test]
fn test_filter_out_delegate_to_removes_adjacent_matches() {
    let delegate_to = vec![
        entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com"),
        entry("10.0.0.2", "gslb-ns-cloud-example-com-eu.example.com"),
        entry("10.0.0.3", "gslb-ns-cloud-example-com-eu.example.com"),
        entry("10.1.0.1", "gslb-ns-cloud-example-com-za.example.com"),
        entry("10.1.0.2", "gslb-ns-cloud-example-com-za.example.com"),
        entry("10.1.0.3", "gslb-ns-cloud-example-com-za.example.com"),
    ];

    let filtered =
        filter_out_delegate_to(delegate_to, "gslb-ns-cloud-example-com-za.example.com");

    assert_eq!(
        filtered,
        vec![
            entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com"),
            entry("10.0.0.2", "gslb-ns-cloud-example-com-eu.example.com"),
            entry("10.0.0.3", "gslb-ns-cloud-example-com-eu.example.com"),
        ]
    );
}

#[test]
fn test_dedup_name_servers_first_occurrence_wins() {
    let delegate_to = vec![
        entry("10.0.0.1", "ns-a"),
        entry("10.0.0.1", "ns-a"),
        entry("10.0.0.1", "ns-b"),
    ];

    let deduped = dedup_name_servers(delegate_to);

    assert_eq!(
        deduped,
        vec![entry("10.0.0.1", "ns-a"), entry("10.0.0.1", "ns-b")]
    );
}

#[tokio::test]
async fn test_merge_preserves_fresh_peers_and_replaces_own_entries() {
    let mut assistant = MockAssistant::with_ingress_ips(&["10.1.0.1", "10.1.0.2"]);
    assistant.set_heartbeat("test-gslb-heartbeat-eu.example.com", true);
    let seeded = vec![
        entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com"),
        // A stale address of our own that the merge must replace
        entry("10.9.9.9", "gslb-ns-cloud-example-com-za.example.com"),
    ];
    let (provider, fake) = provider_with("za", &["eu"], seeded, assistant);

    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();

    let delegate_to = fake.delegate_to();
    // Peer entry preserved verbatim
    assert!(delegate_to
        .contains(&entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com")));
    // Own entries equal exactly the current ingress IPs
    let own: Vec<_> = delegate_to
        .iter()
        .filter(|e| e.name == "gslb-ns-cloud-example-com-za.example.com")
        .collect();
    assert_eq!(
        own.iter().map(|e| e.address.as_str()).collect::<Vec<_>>(),
        vec!["10.1.0.1", "10.1.0.2"]
    );
    assert!(!delegate_to
        .contains(&entry("10.9.9.9", "gslb-ns-cloud-example-com-za.example.com")));
}

#[tokio::test]
async fn test_merge_evicts_peers_with_expired_heartbeat() {
    let mut assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    assistant.set_heartbeat("test-gslb-heartbeat-eu.example.com", false);
    let seeded = vec![entry(
        "10.0.0.1",
        "gslb-ns-cloud-example-com-eu.example.com",
    )];
    let (provider, fake) = provider_with("za", &["eu"], seeded, assistant);

    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();

    let delegate_to = fake.delegate_to();
    assert!(
        delegate_to
            .iter()
            .all(|e| e.name != "gslb-ns-cloud-example-com-eu.example.com"),
        "stale peer must be evicted: {delegate_to:?}"
    );
    assert!(delegate_to
        .contains(&entry("10.1.0.1", "gslb-ns-cloud-example-com-za.example.com")));
}

#[tokio::test]
async fn test_merge_writes_a_fresh_heartbeat() {
    let mut assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    assistant.set_heartbeat("test-gslb-heartbeat-eu.example.com", true);
    let (provider, fake) = provider_with("za", &["eu"], Vec::new(), assistant);

    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();

    let literal = fake
        .txt_text("test-gslb-heartbeat-za.example.com")
        .expect("heartbeat TXT missing");
    let written = NaiveDateTime::parse_from_str(&literal, HEARTBEAT_TIMESTAMP_FORMAT).unwrap();
    let age = Utc::now().naive_utc().signed_duration_since(written);
    assert!(age.num_seconds() < 5, "heartbeat not fresh: {literal}");
}

#[tokio::test]
async fn test_merge_updates_existing_heartbeat_in_place() {
    let mut assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    assistant.set_heartbeat("test-gslb-heartbeat-eu.example.com", true);
    let (provider, fake) = provider_with("za", &["eu"], Vec::new(), assistant);

    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();
    let first = fake.txt_text("test-gslb-heartbeat-za.example.com").unwrap();
    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();
    let second = fake.txt_text("test-gslb-heartbeat-za.example.com").unwrap();

    // Parsing both proves the update path kept the literal format
    for literal in [&first, &second] {
        NaiveDateTime::parse_from_str(literal, HEARTBEAT_TIMESTAMP_FORMAT).unwrap();
    }
}

#[tokio::test]
async fn test_zone_fqdn_mismatch_is_surfaced() {
    let assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    let config = test_config("za", &["eu"]);
    let fake = Arc::new(FakeInfoblox::with_zone("other.example.com", Vec::new()));
    let provider = InfobloxProvider::with_fake(config, Arc::new(assistant), fake);

    let err = provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap_err();

    assert!(matches!(err, crate::errors::DnsError::ZoneFqdnMismatch { .. }));
}

#[tokio::test]
async fn test_finalize_removes_only_own_records() {
    let mut assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    assistant.set_heartbeat("test-gslb-heartbeat-eu.example.com", true);
    let seeded = vec![
        entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com"),
        entry("10.1.0.1", "gslb-ns-cloud-example-com-za.example.com"),
    ];
    let (provider, fake) = provider_with("za", &["eu"], seeded, assistant);
    // Lay down our own heartbeat first
    provider
        .create_zone_delegation_for_external_dns(&gslb())
        .await
        .unwrap();

    provider.finalize(&gslb()).await.unwrap();

    let delegate_to = fake.delegate_to();
    assert_eq!(
        delegate_to,
        vec![entry("10.0.0.1", "gslb-ns-cloud-example-com-eu.example.com")],
        "peer entries must survive finalize"
    );
    assert!(fake
        .txt_text("test-gslb-heartbeat-za.example.com")
        .is_none());
}

#[tokio::test]
async fn test_finalize_deletes_zone_when_no_entries_remain() {
    let assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    let seeded = vec![entry(
        "10.1.0.1",
        "gslb-ns-cloud-example-com-za.example.com",
    )];
    let (provider, fake) = provider_with("za", &[], seeded, assistant);

    provider.finalize(&gslb()).await.unwrap();

    assert!(fake.zone_deleted());
}

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let assistant = MockAssistant::with_ingress_ips(&["10.1.0.1"]);
    let (provider, fake) = provider_with("za", &[], Vec::new(), assistant);

    provider.finalize(&gslb()).await.unwrap();
    provider.finalize(&gslb()).await.unwrap();

    assert!(fake.zone_deleted());
}
