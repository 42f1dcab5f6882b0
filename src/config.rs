// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration resolution.
//!
//! This module abstracts the controller's configuration into a single point
//! of access:
//!
//! - merges environment bindings with predefined defaults
//! - validates the result and classifies failures as [`ConfigError`]
//! - executes once: the first call resolves, every later call returns the
//!   same immutable result
//!
//! Per-`Gslb` strategy fields are resolved separately by
//! [`resolve_gslb_strategy`], which applies the strategy defaults and checks
//! the invariants that depend on both the cluster configuration and the
//! declared strategy (weight coverage, split-brain timing).

use crate::constants::{
    DEFAULT_DNS_TTL_SECONDS, DEFAULT_INFOBLOX_HTTP_TIMEOUT_SECS,
    DEFAULT_INFOBLOX_POOL_CONNECTIONS, DEFAULT_INFOBLOX_WAPI_VERSION, DEFAULT_OPERATOR_NAMESPACE,
    DEFAULT_RECONCILE_REQUEUE_SECONDS, DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS, STRATEGY_FAILOVER,
    STRATEGY_GEOIP, STRATEGY_ROUND_ROBIN, STRATEGY_WEIGHTED_ROUND_ROBIN,
};
use crate::crd::Strategy;
use crate::errors::ConfigError;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

/// Which edge DNS provider this cluster publishes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeDnsKind {
    /// No edge DNS provider; used during integration testing
    NoEdge,
    /// external-dns with the NS1 backend
    Ns1,
    /// external-dns with the Route53 backend
    Route53,
    /// Infoblox WAPI
    Infoblox,
}

impl std::fmt::Display for EdgeDnsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEdge => write!(f, "NoEdgeDNS"),
            Self::Ns1 => write!(f, "NS1"),
            Self::Route53 => write!(f, "Route53"),
            Self::Infoblox => write!(f, "Infoblox"),
        }
    }
}

/// How the logger prints values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single JSON record per message
    Json,
    /// Human readable, no color
    Mono,
    /// Human readable with highlighted sections
    #[default]
    Color,
}

/// Logger configuration.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Level filter: one of trace, debug, info, warn, error
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Color,
        }
    }
}

/// Infoblox provider configuration.
#[derive(Clone, Debug, Default)]
pub struct InfobloxConfig {
    /// Grid manager host
    pub host: String,
    /// WAPI version, e.g. `2.4`
    pub version: String,
    /// WAPI port
    pub port: u16,
    /// WAPI username
    pub username: String,
    /// WAPI password
    pub password: String,
    /// Per-request timeout in seconds
    pub http_request_timeout_secs: u64,
    /// Connection pool size
    pub http_pool_connections: usize,
}

/// Test environment overrides.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverrideConfig {
    /// Route DNS queries to the in-process fake server on 127.0.0.1:7753
    pub fake_dns_enabled: bool,
    /// Substitute the in-memory Infoblox object API
    pub fake_infoblox_enabled: bool,
}

/// Resolved operator configuration. Immutable for the process lifetime.
#[derive(Clone, Debug)]
pub struct Config {
    /// Requeue interval of the reconcile loop, to pick up external targets
    pub reconcile_requeue_seconds: u64,
    /// This cluster's geo tag; unique within the fleet
    pub cluster_geo_tag: String,
    /// Geo tags of the other clusters, in configured order
    pub ext_clusters_geo_tags: Vec<String>,
    /// Selected edge DNS provider
    pub edge_dns_kind: EdgeDnsKind,
    /// Resolver used for peer queries; `host` or `host:port`
    pub edge_dns_server: String,
    /// Parent zone containing the delegated gslb zone, e.g. `example.com`
    pub edge_dns_zone: String,
    /// Delegated zone controlled by gslb, e.g. `cloud.example.com`
    pub dns_zone: String,
    /// Namespace the operator (and its CoreDNS service) runs in
    pub namespace: String,
    /// Infoblox provider configuration
    pub infoblox: InfobloxConfig,
    /// Test environment overrides
    pub overrides: OverrideConfig,
    /// Whether the delegated zone is served by an exposed CoreDNS
    pub coredns_exposed: bool,
    /// Logger configuration
    pub logger: LoggerConfig,
}

/// A per-`Gslb` strategy after defaulting and validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStrategy {
    /// Which steering policy applies
    pub kind: StrategyType,
    /// Primary cluster for failover; present iff `kind` is `Failover`
    pub primary_geo_tag: Option<String>,
    /// Weight per geo tag; non-empty iff `kind` is `WeightedRoundRobin`
    pub weight: BTreeMap<String, u32>,
    /// Peer heartbeat freshness threshold
    pub split_brain_threshold: Duration,
    /// TTL applied to every emitted record
    pub dns_ttl_seconds: u32,
}

/// The four steering policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyType {
    RoundRobin,
    WeightedRoundRobin,
    Failover,
    Geoip,
}

impl std::fmt::Display for StrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "{STRATEGY_ROUND_ROBIN}"),
            Self::WeightedRoundRobin => write!(f, "{STRATEGY_WEIGHTED_ROUND_ROBIN}"),
            Self::Failover => write!(f, "{STRATEGY_FAILOVER}"),
            Self::Geoip => write!(f, "{STRATEGY_GEOIP}"),
        }
    }
}

static CONFIG: OnceLock<Result<Config, ConfigError>> = OnceLock::new();

/// Resolve the operator configuration from the environment.
///
/// Executes once: the first call reads and validates the environment, every
/// later call returns the cached result unchanged. Callers must not mutate
/// the returned value.
///
/// # Errors
///
/// Returns the (cached) [`ConfigError`] when a required option is missing,
/// unparseable, or inconsistent with the rest of the configuration.
pub fn resolve_operator_config() -> Result<&'static Config, ConfigError> {
    match CONFIG.get_or_init(resolve_from_env) {
        Ok(config) => Ok(config),
        Err(e) => Err(e.clone()),
    }
}

/// Read and validate every recognized environment option.
fn resolve_from_env() -> Result<Config, ConfigError> {
    let cluster_geo_tag = env_string("CLUSTER_GEO_TAG", "");
    if cluster_geo_tag.is_empty() {
        return Err(ConfigError::missing(
            "CLUSTER_GEO_TAG",
            "every cluster in the fleet needs a unique geo tag",
        ));
    }

    let ext_clusters_geo_tags = env_list("EXT_CLUSTERS_GEO_TAGS");
    if ext_clusters_geo_tags.contains(&cluster_geo_tag) {
        return Err(ConfigError::inconsistent(
            "EXT_CLUSTERS_GEO_TAGS",
            format!("own geo tag '{cluster_geo_tag}' listed as an external cluster"),
        ));
    }

    let edge_dns_zone = env_string("EDGE_DNS_ZONE", "");
    let dns_zone = env_string("DNS_ZONE", "");
    if !dns_zone.is_empty()
        && !edge_dns_zone.is_empty()
        && !is_subzone(&dns_zone, &edge_dns_zone)
    {
        return Err(ConfigError::inconsistent(
            "DNS_ZONE",
            format!("'{dns_zone}' is not a subzone of EDGE_DNS_ZONE '{edge_dns_zone}'"),
        ));
    }

    let edge_dns_kind = parse_edge_dns_kind(&env_string("EDGE_DNS_TYPE", ""))?;

    let overrides = OverrideConfig {
        fake_dns_enabled: env_bool("OVERRIDE_FAKE_DNS", false)?,
        fake_infoblox_enabled: env_bool("OVERRIDE_FAKE_INFOBLOX", false)?,
    };

    let infoblox = InfobloxConfig {
        host: env_string("INFOBLOX_GRID_HOST", ""),
        version: env_string("INFOBLOX_WAPI_VERSION", DEFAULT_INFOBLOX_WAPI_VERSION),
        port: env_parse("INFOBLOX_WAPI_PORT", 443)?,
        username: env_string("INFOBLOX_WAPI_USERNAME", ""),
        password: env_string("INFOBLOX_WAPI_PASSWORD", ""),
        http_request_timeout_secs: env_parse(
            "INFOBLOX_HTTP_REQUEST_TIMEOUT",
            DEFAULT_INFOBLOX_HTTP_TIMEOUT_SECS,
        )?,
        http_pool_connections: env_parse(
            "INFOBLOX_HTTP_POOL_CONNECTIONS",
            DEFAULT_INFOBLOX_POOL_CONNECTIONS,
        )?,
    };

    if edge_dns_kind == EdgeDnsKind::Infoblox && !overrides.fake_infoblox_enabled {
        for (field, value) in [
            ("INFOBLOX_GRID_HOST", &infoblox.host),
            ("INFOBLOX_WAPI_USERNAME", &infoblox.username),
            ("INFOBLOX_WAPI_PASSWORD", &infoblox.password),
        ] {
            if value.is_empty() {
                return Err(ConfigError::inconsistent(
                    field,
                    "Infoblox selected as edge DNS but the option is blank",
                ));
            }
        }
    }

    let edge_dns_server = env_string("EDGE_DNS_SERVER", "");
    if edge_dns_kind != EdgeDnsKind::NoEdge {
        for (field, value) in [
            ("EDGE_DNS_SERVER", &edge_dns_server),
            ("EDGE_DNS_ZONE", &edge_dns_zone),
            ("DNS_ZONE", &dns_zone),
        ] {
            if value.is_empty() {
                return Err(ConfigError::missing(
                    field,
                    format!("required when EDGE_DNS_TYPE is {edge_dns_kind}"),
                ));
            }
        }
    }

    let logger = LoggerConfig {
        level: parse_log_level(&env_string("LOG_LEVEL", "info"))?,
        format: parse_log_format(&env_string("LOG_FORMAT", "color"))?,
    };

    Ok(Config {
        reconcile_requeue_seconds: env_parse(
            "RECONCILE_REQUEUE_SECONDS",
            DEFAULT_RECONCILE_REQUEUE_SECONDS,
        )?,
        cluster_geo_tag,
        ext_clusters_geo_tags,
        edge_dns_kind,
        edge_dns_server,
        edge_dns_zone,
        dns_zone,
        namespace: env_string("POD_NAMESPACE", DEFAULT_OPERATOR_NAMESPACE),
        infoblox,
        overrides,
        coredns_exposed: env_bool("COREDNS_EXPOSED", false)?,
        logger,
    })
}

/// Apply defaults to a declared [`Strategy`] and validate it against the
/// cluster configuration.
///
/// # Errors
///
/// Returns a [`ConfigError`] when the strategy type is unknown, `failover`
/// lacks a primary geo tag, weighted round-robin weights do not cover every
/// participating cluster, or the record TTL is not strictly below half of
/// the split-brain threshold.
pub fn resolve_gslb_strategy(
    strategy: &Strategy,
    config: &Config,
) -> Result<ResolvedStrategy, ConfigError> {
    let kind = match strategy.r#type.as_str() {
        STRATEGY_ROUND_ROBIN => StrategyType::RoundRobin,
        STRATEGY_WEIGHTED_ROUND_ROBIN => StrategyType::WeightedRoundRobin,
        STRATEGY_FAILOVER => StrategyType::Failover,
        STRATEGY_GEOIP => StrategyType::Geoip,
        other => {
            return Err(ConfigError::malformed(
                "strategy.type",
                format!("unknown strategy '{other}'"),
            ))
        }
    };

    let primary_geo_tag = strategy
        .primary_geo_tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(ToString::to_string);
    if kind == StrategyType::Failover && primary_geo_tag.is_none() {
        return Err(ConfigError::inconsistent(
            "strategy.primaryGeoTag",
            "failover requires a primary geo tag",
        ));
    }

    let weight = strategy.weight.clone().unwrap_or_default();
    if kind == StrategyType::WeightedRoundRobin {
        let mut required = vec![config.cluster_geo_tag.clone()];
        required.extend(config.ext_clusters_geo_tags.iter().cloned());
        for tag in &required {
            match weight.get(tag) {
                Some(w) if *w > 0 => {}
                _ => {
                    return Err(ConfigError::inconsistent(
                        "strategy.weight",
                        format!("no positive weight declared for cluster '{tag}'"),
                    ))
                }
            }
        }
    }

    let split_brain_threshold_seconds = strategy
        .split_brain_threshold_seconds
        .unwrap_or(DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS);
    let dns_ttl_seconds = strategy.dns_ttl_seconds.unwrap_or(DEFAULT_DNS_TTL_SECONDS);

    // Liveness is inferred from heartbeat age alone. A TTL at or above half
    // the threshold lets a cached heartbeat mask a dead peer.
    if u64::from(dns_ttl_seconds) * 2 >= u64::from(split_brain_threshold_seconds) {
        return Err(ConfigError::inconsistent(
            "strategy.dnsTtlSeconds",
            format!(
                "record TTL {dns_ttl_seconds}s must be strictly below half of the split-brain threshold {split_brain_threshold_seconds}s"
            ),
        ));
    }

    Ok(ResolvedStrategy {
        kind,
        primary_geo_tag,
        weight,
        split_brain_threshold: Duration::from_secs(u64::from(split_brain_threshold_seconds)),
        dns_ttl_seconds,
    })
}

/// Initialize the process-wide logger from the resolved settings.
///
/// Respects `RUST_LOG` if set, otherwise uses the configured level.
/// Call exactly once, before the first reconcile.
pub fn init_logging(logger: &LoggerConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logger.level.clone()));

    match logger.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Mono => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(false)
                .compact()
                .init();
        }
        LogFormat::Color => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Logger configured");
}

/// True when `zone` is a proper subzone of `parent`.
fn is_subzone(zone: &str, parent: &str) -> bool {
    let zone = zone.trim_end_matches('.');
    let parent = parent.trim_end_matches('.');
    zone.len() > parent.len() + 1 && zone.ends_with(&format!(".{parent}"))
}

fn parse_edge_dns_kind(value: &str) -> Result<EdgeDnsKind, ConfigError> {
    match value.to_lowercase().as_str() {
        "" | "noedgedns" => Ok(EdgeDnsKind::NoEdge),
        "ns1" => Ok(EdgeDnsKind::Ns1),
        "route53" => Ok(EdgeDnsKind::Route53),
        "infoblox" => Ok(EdgeDnsKind::Infoblox),
        other => Err(ConfigError::malformed(
            "EDGE_DNS_TYPE",
            format!("unrecognised edge DNS type '{other}'"),
        )),
    }
}

fn parse_log_level(value: &str) -> Result<String, ConfigError> {
    match value.to_lowercase().as_str() {
        level @ ("trace" | "debug" | "info" | "warn" | "error") => Ok(level.to_string()),
        other => Err(ConfigError::malformed(
            "LOG_LEVEL",
            format!("unrecognised level '{other}'"),
        )),
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat, ConfigError> {
    match value.to_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "mono" => Ok(LogFormat::Mono),
        "color" => Ok(LogFormat::Color),
        other => Err(ConfigError::malformed(
            "LOG_FORMAT",
            format!("unrecognised format '{other}', expected json, mono or color"),
        )),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<bool>()
            .map_err(|_| ConfigError::malformed(key, format!("'{raw}' is not a boolean"))),
        Err(_) => Ok(default),
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::malformed(key, format!("cannot parse '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
