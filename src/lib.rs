// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # gslby - GSLB Controller for Kubernetes
//!
//! gslby is a Kubernetes controller written in Rust that steers global
//! traffic across independent clusters through DNS. Each cluster runs an
//! instance; the fleet coordinates through authoritative zone delegation and
//! heartbeat TXT records rather than a shared database.
//!
//! ## Overview
//!
//! For every declared [`crd::Gslb`] the controller keeps two pieces of
//! external state in concert:
//!
//! - DNS records at the authoritative edge provider directing clients to the
//!   healthiest cluster(s) for each hostname
//! - a local [`crd::DNSEndpoint`] object consumed by an external-dns agent
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definitions (`Gslb`, `DNSEndpoint`)
//! - [`config`] - once-only configuration resolution and validation
//! - [`assistant`] - Kubernetes reads/writes and direct DNS exchanges
//! - [`strategy`] - pure endpoint computation for the steering strategies
//! - [`dns`] - edge DNS providers (NoEdge, external-dns NS1/Route53, Infoblox)
//! - [`reconciler`] - the idempotent reconcile pipeline
//! - [`ingress`] - managed Ingress derivation and persistence
//! - [`fakedns`] - test DNS server answering on 127.0.0.1:7753
//!
//! ## Example
//!
//! ```rust,no_run
//! use gslby::crd::{GslbSpec, Strategy};
//! use k8s_openapi::api::networking::v1::IngressSpec;
//!
//! // Declare a round-robin Gslb steering across every healthy cluster
//! let spec = GslbSpec {
//!     ingress: IngressSpec::default(),
//!     strategy: Strategy {
//!         r#type: "roundRobin".to_string(),
//!         ..Strategy::default()
//!     },
//! };
//! ```

pub mod assistant;
pub mod config;
pub mod constants;
pub mod crd;
pub mod dns;
pub mod errors;
pub mod fakedns;
pub mod ingress;
pub mod metrics;
pub mod reconciler;
pub mod strategy;

#[cfg(test)]
pub mod test_support;
