// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the gslby operator.
//!
//! Two taxonomies live here:
//!
//! - [`ConfigError`] - configuration resolution and validation failures,
//!   fatal at startup and requeue-with-error when surfaced per reconcile
//! - [`DnsError`] - failures of the outward-facing operations (DNS exchanges,
//!   Kubernetes API calls, Infoblox WAPI requests) plus the non-error
//!   [`DnsError::HeartbeatExpired`] signal that drives the split-brain filter
//!
//! These errors provide structured error handling for reconcile operations,
//! enabling better error reporting in status conditions and metrics.

use thiserror::Error;

/// Classification of a configuration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A required option is absent
    Missing,
    /// An option is present but cannot be parsed
    Malformed,
    /// Options are individually valid but mutually contradictory
    Inconsistent,
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Malformed => write!(f, "malformed"),
            Self::Inconsistent => write!(f, "inconsistent"),
        }
    }
}

/// A configuration resolution or validation failure.
///
/// Fatal when raised during startup; per-reconcile occurrences (e.g. an
/// invalid strategy on a single `Gslb`) are surfaced as requeue-with-error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration ({kind}) for '{field}': {detail}")]
pub struct ConfigError {
    /// What class of failure this is
    pub kind: ConfigErrorKind,
    /// The option or spec field at fault
    pub field: String,
    /// Human-readable explanation
    pub detail: String,
}

impl ConfigError {
    /// A required option is absent.
    pub fn missing(field: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Missing,
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    /// An option cannot be parsed.
    pub fn malformed(field: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Malformed,
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    /// Options contradict each other.
    pub fn inconsistent(field: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Inconsistent,
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

/// Failures of the outward-facing reconcile operations.
#[derive(Error, Debug)]
pub enum DnsError {
    /// A DNS exchange failed (timeout, transport error, refused)
    #[error("DNS exchange with {server} for '{fqdn}' failed: {reason}")]
    Exchange {
        /// The queried name
        fqdn: String,
        /// The resolver or authoritative server that was asked
        server: String,
        /// What went wrong
        reason: String,
    },

    /// A heartbeat TXT record is absent, unparseable, or older than the
    /// split-brain threshold. Not a reconcile failure: it feeds the
    /// delegation merge which drops the stale peer.
    #[error("heartbeat TXT record '{fqdn}' expired: {detail}")]
    HeartbeatExpired {
        /// The heartbeat record name
        fqdn: String,
        /// Why the record is considered expired
        detail: String,
    },

    /// The CoreDNS LoadBalancer service has no ingress entry yet
    #[error("service '{service}' has no LoadBalancer ingress entries yet")]
    CoreDnsNotReady {
        /// The service that is not ready
        service: String,
    },

    /// The delegated zone returned by Infoblox is not the zone this
    /// controller manages
    #[error("delegated zone returned from Infoblox ({found}) does not match requested gslb zone ({expected})")]
    ZoneFqdnMismatch {
        /// The zone this controller manages
        expected: String,
        /// The zone Infoblox answered with
        found: String,
    },

    /// The Infoblox WAPI answered with a non-success HTTP status
    #[error("Infoblox WAPI request '{path}' failed with HTTP {status}: {body}")]
    WapiStatus {
        /// Request path relative to the WAPI base
        path: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// A per-Gslb strategy failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Kubernetes API failure
    #[error(transparent)]
    Kube(#[from] kube::Error),

    /// HTTP transport failure talking to the Infoblox WAPI
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl DnsError {
    /// Returns true if this error is transient and the reconcile should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Exchange { .. } | Self::CoreDnsNotReady { .. } | Self::Kube(_) | Self::Http(_) => {
                true
            }
            Self::WapiStatus { status, .. } => *status >= 500,
            Self::HeartbeatExpired { .. } | Self::ZoneFqdnMismatch { .. } | Self::Config(_) => {
                false
            }
        }
    }

    /// Returns the status reason code for this error, used in status
    /// conditions and error metrics labels.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Exchange { .. } => "DnsExchangeFailed",
            Self::HeartbeatExpired { .. } => "HeartbeatExpired",
            Self::CoreDnsNotReady { .. } => "CoreDnsNotReady",
            Self::ZoneFqdnMismatch { .. } => "ZoneFqdnMismatch",
            Self::WapiStatus { .. } => "InfobloxRequestFailed",
            Self::Config(_) => "InvalidConfiguration",
            Self::Kube(_) => "KubeApiFailed",
            Self::Http(_) => "InfobloxUnreachable",
        }
    }

    /// Returns true when the underlying cause is a Kubernetes `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Returns true when the underlying cause is an optimistic-concurrency
    /// conflict on a Kubernetes write.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
