// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider used when no edge DNS exists (integration testing).

use super::{DnsProvider, ExternalTargets};
use crate::assistant::Assistant;
use crate::config::Config;
use crate::crd::{DNSEndpoint, Gslb};
use crate::errors::DnsError;
use async_trait::async_trait;
use kube::ResourceExt;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Keeps the local `DNSEndpoint` in sync but never touches any edge DNS.
pub struct NoEdgeProvider {
    #[allow(dead_code)]
    config: Config,
    assistant: Arc<dyn Assistant>,
}

impl NoEdgeProvider {
    #[must_use]
    pub fn new(config: Config, assistant: Arc<dyn Assistant>) -> Self {
        Self { config, assistant }
    }
}

#[async_trait]
impl DnsProvider for NoEdgeProvider {
    async fn create_zone_delegation_for_external_dns(&self, gslb: &Gslb) -> Result<(), DnsError> {
        debug!(gslb = %gslb.name_any(), "No edge DNS configured, skipping zone delegation");
        Ok(())
    }

    async fn finalize(&self, gslb: &Gslb) -> Result<(), DnsError> {
        debug!(gslb = %gslb.name_any(), "No edge DNS configured, nothing to finalize");
        Ok(())
    }

    async fn get_external_targets(&self, _host: &str) -> ExternalTargets {
        ExternalTargets::default()
    }

    async fn gslb_ingress_exposed_ips(&self, gslb: &Gslb) -> Result<Vec<String>, DnsError> {
        self.assistant.gslb_ingress_exposed_ips(gslb).await
    }

    async fn save_dns_endpoint(&self, gslb: &Gslb, desired: &DNSEndpoint) -> Result<(), DnsError> {
        self.assistant
            .save_dns_endpoint(&gslb.namespace().unwrap_or_default(), desired)
            .await
    }
}

impl fmt::Display for NoEdgeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoEdgeDNS")
    }
}
