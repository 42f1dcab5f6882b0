// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Strategy engine: computes the desired DNS endpoints for a `Gslb`.
//!
//! This is a pure function from the resolved strategy and the observed
//! targets (local ingress addresses, per-peer external addresses) to the
//! endpoint list written into the `DNSEndpoint`. All DNS and Kubernetes I/O
//! happens before this module is called.
//!
//! For every ingress host `h` two endpoints are produced:
//!
//! - `h` - the aggregate record steering clients, composed per strategy
//! - `localtargets-h` - this cluster's addresses only, read by peers
//!
//! Records with no targets are never emitted, targets are deduplicated, and
//! target ordering is lexicographic so consecutive reconciles with the same
//! observations produce byte-identical specs.

use crate::config::{ResolvedStrategy, StrategyType};
use crate::constants::{LOCALTARGETS_PREFIX, MAX_WEIGHTED_REPLICAS, PROVIDER_SPECIFIC_GEO_CODE};
use crate::crd::{Endpoint, ProviderSpecificProperty};
use std::collections::BTreeSet;

/// Everything observed about a single ingress host.
#[derive(Clone, Debug, Default)]
pub struct HostObservation {
    /// The ingress rule host
    pub host: String,
    /// Addresses exposed by this cluster's ingress
    pub local: Vec<String>,
    /// Addresses learned from each external cluster, in configured tag order
    pub external_by_tag: Vec<(String, Vec<String>)>,
}

impl HostObservation {
    /// All external addresses, flattened in configured tag order.
    #[must_use]
    pub fn external(&self) -> Vec<String> {
        self.external_by_tag
            .iter()
            .flat_map(|(_, ips)| ips.iter().cloned())
            .collect()
    }

    fn external_for_tag(&self, tag: &str) -> Vec<String> {
        self.external_by_tag
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, ips)| ips.clone())
            .unwrap_or_default()
    }
}

/// Compute the desired endpoints for every observed host.
#[must_use]
pub fn resolve_endpoints(
    strategy: &ResolvedStrategy,
    cluster_geo_tag: &str,
    observations: &[HostObservation],
) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for observation in observations {
        let targets = aggregate_targets(strategy, cluster_geo_tag, observation);
        if !targets.is_empty() {
            let mut endpoint =
                Endpoint::a_record(&observation.host, strategy.dns_ttl_seconds, targets);
            if strategy.kind == StrategyType::Geoip {
                endpoint.provider_specific = Some(vec![ProviderSpecificProperty {
                    name: PROVIDER_SPECIFIC_GEO_CODE.to_string(),
                    value: cluster_geo_tag.to_string(),
                }]);
            }
            endpoints.push(endpoint);
        }

        let local = sorted_unique(&observation.local);
        if !local.is_empty() {
            let name = format!("{LOCALTARGETS_PREFIX}-{}", observation.host);
            endpoints.push(Endpoint::a_record(&name, strategy.dns_ttl_seconds, local));
        }
    }
    endpoints
}

/// Targets of the aggregate record for one host.
fn aggregate_targets(
    strategy: &ResolvedStrategy,
    cluster_geo_tag: &str,
    observation: &HostObservation,
) -> Vec<String> {
    match strategy.kind {
        StrategyType::RoundRobin => {
            let mut members = observation.local.clone();
            members.extend(observation.external());
            sorted_unique(&members)
        }
        StrategyType::WeightedRoundRobin => {
            weighted_targets(strategy, cluster_geo_tag, observation)
        }
        StrategyType::Failover => failover_targets(strategy, cluster_geo_tag, observation),
        StrategyType::Geoip => sorted_unique(&observation.local),
    }
}

/// Failover: the primary answers while it has targets, everybody else points
/// clients at the primary, and a cluster cut off from the primary serves
/// itself as a last resort.
fn failover_targets(
    strategy: &ResolvedStrategy,
    cluster_geo_tag: &str,
    observation: &HostObservation,
) -> Vec<String> {
    let primary = strategy.primary_geo_tag.as_deref().unwrap_or_default();

    if cluster_geo_tag == primary && !observation.local.is_empty() {
        return sorted_unique(&observation.local);
    }
    let primary_targets = observation.external_for_tag(primary);
    if !primary_targets.is_empty() {
        return sorted_unique(&primary_targets);
    }
    sorted_unique(&observation.local)
}

/// Weighted round-robin: same membership as round-robin, with each address
/// replicated in proportion to its cluster's integer weight (reduced by the
/// gcd of the participating weights). The replica total is capped at 255 by
/// proportional scale-down with a floor of one replica per address.
fn weighted_targets(
    strategy: &ResolvedStrategy,
    cluster_geo_tag: &str,
    observation: &HostObservation,
) -> Vec<String> {
    // Clusters in composition order, local first. Duplicate addresses keep
    // their first cluster's attribution (and thereby its weight).
    let mut clusters: Vec<(String, Vec<String>)> = Vec::new();
    clusters.push((cluster_geo_tag.to_string(), observation.local.clone()));
    clusters.extend(observation.external_by_tag.iter().cloned());

    let mut seen = BTreeSet::new();
    for (_, ips) in &mut clusters {
        ips.retain(|ip| seen.insert(ip.clone()));
    }
    clusters.retain(|(_, ips)| !ips.is_empty());
    if clusters.is_empty() {
        return Vec::new();
    }

    let weights: Vec<u32> = clusters
        .iter()
        .map(|(tag, _)| *strategy.weight.get(tag).unwrap_or(&1))
        .collect();
    let divisor = weights.iter().copied().fold(0, gcd).max(1);
    let mut replicas: Vec<usize> = weights
        .iter()
        .map(|w| ((w / divisor) as usize).max(1))
        .collect();

    let total: usize = clusters
        .iter()
        .zip(&replicas)
        .map(|((_, ips), r)| ips.len() * r)
        .sum();
    if total > MAX_WEIGHTED_REPLICAS {
        let factor = MAX_WEIGHTED_REPLICAS as f64 / total as f64;
        for r in &mut replicas {
            *r = (((*r as f64) * factor).floor() as usize).max(1);
        }
    }

    let mut replicated: Vec<(String, usize)> = clusters
        .iter()
        .zip(&replicas)
        .flat_map(|((_, ips), r)| {
            let r = *r;
            ips.iter().map(move |ip| (ip.clone(), r))
        })
        .collect();
    replicated.sort();

    replicated
        .into_iter()
        .flat_map(|(ip, r)| std::iter::repeat(ip).take(r))
        .collect()
}

/// Deduplicate and order targets lexicographically.
fn sorted_unique(targets: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    for target in targets {
        if seen.insert(target.clone()) {
            unique.push(target.clone());
        }
    }
    unique.sort();
    unique
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod strategy_tests;
