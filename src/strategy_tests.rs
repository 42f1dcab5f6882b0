// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the strategy engine.

use super::*;
use crate::config::{ResolvedStrategy, StrategyType};
use std::collections::BTreeMap;
use std::time::Duration;

fn strategy(kind: StrategyType) -> ResolvedStrategy {
    ResolvedStrategy {
        kind,
        primary_geo_tag: None,
        weight: BTreeMap::new(),
        split_brain_threshold: Duration::from_secs(300),
        dns_ttl_seconds: 30,
    }
}

fn failover(primary: &str) -> ResolvedStrategy {
    ResolvedStrategy {
        primary_geo_tag: Some(primary.to_string()),
        ..strategy(StrategyType::Failover)
    }
}

fn observation(host: &str, local: &[&str], external: &[(&str, &[&str])]) -> HostObservation {
    HostObservation {
        host: host.to_string(),
        local: local.iter().map(ToString::to_string).collect(),
        external_by_tag: external
            .iter()
            .map(|(tag, ips)| {
                (
                    tag.to_string(),
                    ips.iter().map(ToString::to_string).collect(),
                )
            })
            .collect(),
    }
}

fn targets_of<'a>(endpoints: &'a [crate::crd::Endpoint], name: &str) -> Option<&'a Vec<String>> {
    endpoints
        .iter()
        .find(|e| e.dns_name == name)
        .map(|e| &e.targets)
}

#[test]
fn test_round_robin_dedups_and_sorts() {
    // Arrange: duplicate 10.0.0.1 appears both locally and in the us cluster
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("eu", &["10.0.0.2"]), ("us", &["10.0.0.3", "10.0.0.1"])],
    );

    // Act
    let endpoints = resolve_endpoints(&strategy(StrategyType::RoundRobin), "za", &[obs]);

    // Assert
    assert_eq!(
        targets_of(&endpoints, "app.cloud.example.com"),
        Some(&vec![
            "10.0.0.1".to_string(),
            "10.0.0.2".to_string(),
            "10.0.0.3".to_string()
        ])
    );
}

#[test]
fn test_round_robin_emits_localtargets_with_local_set_only() {
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.2", "10.0.0.1"],
        &[("eu", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy(StrategyType::RoundRobin), "za", &[obs]);

    assert_eq!(
        targets_of(&endpoints, "localtargets-app.cloud.example.com"),
        Some(&vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
    );
}

#[test]
fn test_no_targets_emits_no_endpoints() {
    let obs = observation("app.cloud.example.com", &[], &[("eu", &[])]);

    let endpoints = resolve_endpoints(&strategy(StrategyType::RoundRobin), "za", &[obs]);

    assert!(endpoints.is_empty(), "empty A records must never be emitted");
}

#[test]
fn test_failover_primary_up_serves_local() {
    // ClusterGeoTag == PrimaryGeoTag and local targets exist
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1", "10.0.0.2"],
        &[("za", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&failover("eu"), "eu", &[obs]);

    assert_eq!(
        targets_of(&endpoints, "app.cloud.example.com"),
        Some(&vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
    );
}

#[test]
fn test_failover_secondary_points_at_healthy_primary() {
    let obs = observation(
        "app.cloud.example.com",
        &["10.1.0.1"],
        &[("eu", &["10.0.0.1", "10.0.0.2"])],
    );

    let endpoints = resolve_endpoints(&failover("eu"), "za", &[obs]);

    // Every target must come from the primary's external set
    let targets = targets_of(&endpoints, "app.cloud.example.com").unwrap();
    assert_eq!(
        targets,
        &vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
    );
}

#[test]
fn test_failover_primary_down_serves_local_as_last_resort() {
    // Observed from za: the eu primary answers nothing
    let obs = observation("app.cloud.example.com", &["10.1.0.1"], &[("eu", &[])]);

    let endpoints = resolve_endpoints(&failover("eu"), "za", &[obs]);

    assert_eq!(
        targets_of(&endpoints, "app.cloud.example.com"),
        Some(&vec!["10.1.0.1".to_string()])
    );
}

#[test]
fn test_geoip_serves_local_with_geo_code() {
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("za", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy(StrategyType::Geoip), "eu", &[obs]);

    let endpoint = endpoints
        .iter()
        .find(|e| e.dns_name == "app.cloud.example.com")
        .unwrap();
    assert_eq!(endpoint.targets, vec!["10.0.0.1".to_string()]);
    let props = endpoint.provider_specific.as_ref().unwrap();
    assert_eq!(props[0].name, "geo-code");
    assert_eq!(props[0].value, "eu");
}

#[test]
fn test_weighted_replicates_in_weight_proportion() {
    let mut strategy = strategy(StrategyType::WeightedRoundRobin);
    strategy.weight =
        BTreeMap::from([("eu".to_string(), 10), ("za".to_string(), 5)]);
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("za", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy, "eu", &[obs]);

    // gcd(10, 5) = 5, so the local address gets two replicas, the peer one
    let targets = targets_of(&endpoints, "app.cloud.example.com").unwrap();
    assert_eq!(
        targets,
        &vec![
            "10.0.0.1".to_string(),
            "10.0.0.1".to_string(),
            "10.1.0.1".to_string()
        ]
    );
}

#[test]
fn test_weighted_caps_total_replicas() {
    let mut strategy = strategy(StrategyType::WeightedRoundRobin);
    strategy.weight =
        BTreeMap::from([("eu".to_string(), 1000), ("za".to_string(), 1)]);
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("za", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy, "eu", &[obs]);

    let targets = targets_of(&endpoints, "app.cloud.example.com").unwrap();
    assert!(targets.len() <= 255, "total replicas exceed the cap");
    // Even a tiny weight keeps the cluster represented
    assert!(targets.contains(&"10.1.0.1".to_string()));
}

#[test]
fn test_weighted_dedups_across_clusters() {
    let mut strategy = strategy(StrategyType::WeightedRoundRobin);
    strategy.weight = BTreeMap::from([("eu".to_string(), 2), ("za".to_string(), 1)]);
    // The same address shows up locally and from the peer
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("za", &["10.0.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy, "eu", &[obs]);

    // The address keeps its first (local) attribution and, with a single
    // participating cluster left, normalizes down to one replica
    let targets = targets_of(&endpoints, "app.cloud.example.com").unwrap();
    assert_eq!(targets, &vec!["10.0.0.1".to_string()]);
}

#[test]
fn test_every_endpoint_carries_the_strategy_ttl() {
    let mut strategy = strategy(StrategyType::RoundRobin);
    strategy.dns_ttl_seconds = 45;
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.1"],
        &[("za", &["10.1.0.1"])],
    );

    let endpoints = resolve_endpoints(&strategy, "eu", &[obs]);

    assert!(!endpoints.is_empty());
    for endpoint in &endpoints {
        assert_eq!(endpoint.record_ttl, Some(45), "{}", endpoint.dns_name);
    }
}

#[test]
fn test_identical_inputs_produce_identical_endpoints() {
    let obs = observation(
        "app.cloud.example.com",
        &["10.0.0.2", "10.0.0.1"],
        &[("eu", &["10.1.0.2", "10.1.0.1"])],
    );
    let strategy = strategy(StrategyType::RoundRobin);

    let first = resolve_endpoints(&strategy, "za", std::slice::from_ref(&obs));
    let second = resolve_endpoints(&strategy, "za", std::slice::from_ref(&obs));

    assert_eq!(first, second);
}
