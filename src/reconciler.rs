// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gslb reconciliation.
//!
//! One idempotent pipeline per tick: observe the Gslb, its managed Ingress
//! and the peer clusters, compute the desired endpoints, hand them to the
//! provider, publish the heartbeat, update status, decide the requeue.
//!
//! Every external call is retried by re-reconciliation, never in-line. Write
//! conflicts on the managed Ingress or the `DNSEndpoint` mean somebody else
//! got there first and are treated as success with an immediate requeue;
//! missing dependent objects requeue without an error. Everything else is
//! surfaced to the controller runtime, which rate-limits retries.

use crate::config::{resolve_gslb_strategy, Config};
use crate::constants::{ERROR_REQUEUE_DURATION_SECS, GSLB_FINALIZER, KIND_GSLB};
use crate::crd::{DNSEndpoint, DNSEndpointSpec, Endpoint, Gslb, GslbStatus};
use crate::dns::DnsProvider;
use crate::ingress::{self, IngressSaveOutcome};
use crate::metrics;
use crate::strategy::{self, HostObservation};
use anyhow::Context as _;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Backend service health values reported in `GslbStatus`.
const HEALTH_HEALTHY: &str = "Healthy";
const HEALTH_UNHEALTHY: &str = "Unhealthy";
const HEALTH_NOT_FOUND: &str = "NotFound";

/// Shared context handed to every reconcile.
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Resolved operator configuration
    pub config: Config,
    /// The edge DNS provider selected at startup
    pub provider: Arc<dyn DnsProvider>,
}

/// Error type surfaced to the controller runtime.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Run the Gslb controller until the watch stream ends.
///
/// # Errors
///
/// Returns an error when the initial watch cannot be established.
pub async fn run_controller(ctx: Arc<Context>) -> anyhow::Result<()> {
    info!("Starting Gslb controller");

    let gslbs = Api::<Gslb>::all(ctx.client.clone());
    let ingresses = Api::<Ingress>::all(ctx.client.clone());
    let endpoints = Api::<DNSEndpoint>::all(ctx.client.clone());

    Controller::new(gslbs, watcher::Config::default())
        .owns(ingresses, watcher::Config::default())
        .owns(endpoints, watcher::Config::default())
        .run(reconcile_gslb, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper: timing and metrics around the pipeline.
pub async fn reconcile_gslb(
    gslb: Arc<Gslb>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    debug!(
        gslb = %gslb.name_any(),
        namespace = ?gslb.namespace(),
        "Reconcile called for Gslb"
    );

    let result = reconcile_inner(&gslb, &ctx).await;
    let duration = start.elapsed();

    match result {
        Ok(action) => {
            metrics::record_reconciliation_success(KIND_GSLB, duration);
            Ok(action)
        }
        Err(e) => {
            error!(gslb = %gslb.name_any(), error = ?e, "Failed to reconcile Gslb");
            metrics::record_reconciliation_error(KIND_GSLB, duration);
            metrics::record_error(KIND_GSLB, "reconcile_error");
            Err(ReconcileError(e))
        }
    }
}

/// Error policy: the runtime applies its rate limiter on top of this delay.
fn error_policy(_gslb: Arc<Gslb>, _err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// The reconcile pipeline.
async fn reconcile_inner(gslb: &Gslb, ctx: &Context) -> anyhow::Result<Action> {
    let name = gslb.name_any();
    let namespace = gslb.namespace().unwrap_or_default();
    let api: Api<Gslb> = Api::namespaced(ctx.client.clone(), &namespace);

    // Deletion is handled before strategy validation so a Gslb with a broken
    // strategy can still be cleaned up.
    if gslb.meta().deletion_timestamp.is_some() {
        if has_finalizer(gslb) {
            ctx.provider
                .finalize(gslb)
                .await
                .context("Can't finalize GSLB")?;
            remove_finalizer(&api, gslb).await?;
            info!(gslb = %name, "Successfully finalized Gslb");
        }
        return Ok(Action::await_change());
    }

    // The finalizer must be persisted before any external state exists,
    // otherwise a deletion racing the first reconcile would leak records.
    if !has_finalizer(gslb) {
        info!(gslb = %name, "Adding finalizer for the Gslb");
        add_finalizer(&api, gslb).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let strategy = resolve_gslb_strategy(&gslb.spec.strategy, &ctx.config)?;

    let desired = ingress::desired_ingress(gslb, &strategy);
    if ingress::save_ingress(&ctx.client, gslb, &desired).await? == IngressSaveOutcome::Conflict {
        return Ok(Action::requeue(Duration::ZERO));
    }

    let local = match ctx.provider.gslb_ingress_exposed_ips(gslb).await {
        Ok(ips) => ips,
        Err(e) if e.is_not_found() => {
            debug!(gslb = %name, "Managed Ingress not observable yet, requeueing");
            return Ok(Action::requeue(Duration::ZERO));
        }
        Err(e) => return Err(anyhow::Error::from(e).context("reading ingress exposed IPs")),
    };

    let mut observations = Vec::new();
    for host in rule_hosts(gslb) {
        let external = ctx.provider.get_external_targets(&host).await;
        observations.push(HostObservation {
            host,
            local: local.clone(),
            external_by_tag: external.0,
        });
    }

    let endpoints =
        strategy::resolve_endpoints(&strategy, &ctx.config.cluster_geo_tag, &observations);
    let dns_endpoint = managed_dns_endpoint(gslb, endpoints.clone());

    match ctx.provider.save_dns_endpoint(gslb, &dns_endpoint).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => return Ok(Action::requeue(Duration::ZERO)),
        Err(e) => return Err(anyhow::Error::from(e).context("saving DNSEndpoint")),
    }

    ctx.provider
        .create_zone_delegation_for_external_dns(gslb)
        .await
        .context("publishing zone delegation")?;

    let status = observed_status(ctx, gslb, &endpoints).await;
    update_status_if_changed(&api, gslb, status).await?;

    Ok(Action::requeue(Duration::from_secs(
        ctx.config.reconcile_requeue_seconds,
    )))
}

/// True when the Gslb carries the controller finalizer.
fn has_finalizer(gslb: &Gslb) -> bool {
    gslb.finalizers().iter().any(|f| f == GSLB_FINALIZER)
}

/// Persist the finalizer. Idempotent: the list is treated as a set.
async fn add_finalizer(api: &Api<Gslb>, gslb: &Gslb) -> anyhow::Result<()> {
    let mut finalizers = gslb.finalizers().to_vec();
    if !finalizers.iter().any(|f| f == GSLB_FINALIZER) {
        finalizers.push(GSLB_FINALIZER.to_string());
    }
    patch_finalizers(api, &gslb.name_any(), finalizers).await
}

/// Remove the first occurrence of the finalizer only; duplicates introduced
/// by third parties must not make removal skip entries.
async fn remove_finalizer(api: &Api<Gslb>, gslb: &Gslb) -> anyhow::Result<()> {
    let mut finalizers = gslb.finalizers().to_vec();
    if let Some(position) = finalizers.iter().position(|f| f == GSLB_FINALIZER) {
        finalizers.remove(position);
    }
    patch_finalizers(api, &gslb.name_any(), finalizers).await
}

async fn patch_finalizers(
    api: &Api<Gslb>,
    name: &str,
    finalizers: Vec<String>,
) -> anyhow::Result<()> {
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .context("patching Gslb finalizers")?;
    Ok(())
}

/// Hosts declared by the embedded ingress rules.
fn rule_hosts(gslb: &Gslb) -> Vec<String> {
    gslb.spec
        .ingress
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.host.clone())
        .collect()
}

/// The `DNSEndpoint` owned by this Gslb: same name, same namespace.
fn managed_dns_endpoint(gslb: &Gslb, endpoints: Vec<Endpoint>) -> DNSEndpoint {
    DNSEndpoint {
        metadata: ObjectMeta {
            name: Some(gslb.name_any()),
            namespace: gslb.namespace(),
            owner_references: gslb.controller_owner_ref(&()).map(|oref| vec![oref]),
            ..ObjectMeta::default()
        },
        spec: DNSEndpointSpec { endpoints },
    }
}

/// Compose the status of this tick and publish the healthy-records gauge.
async fn observed_status(ctx: &Context, gslb: &Gslb, endpoints: &[Endpoint]) -> GslbStatus {
    let mut healthy_records = BTreeMap::new();
    for host in rule_hosts(gslb) {
        if let Some(endpoint) = endpoints.iter().find(|e| e.dns_name == host) {
            healthy_records.insert(host, endpoint.targets.clone());
        }
    }

    metrics::record_healthy_records(
        &gslb.namespace().unwrap_or_default(),
        &gslb.name_any(),
        healthy_records.values().map(Vec::len).sum(),
    );

    GslbStatus {
        service_health: compute_service_health(&ctx.client, gslb).await,
        healthy_records,
        geo_tag: ctx.config.cluster_geo_tag.clone(),
    }
}

/// Health of the backend services behind each ingress host, read from their
/// Endpoints objects: `Healthy` when any backend has ready addresses,
/// `NotFound` when every referenced service is absent, `Unhealthy` otherwise.
async fn compute_service_health(client: &Client, gslb: &Gslb) -> BTreeMap<String, String> {
    let namespace = gslb.namespace().unwrap_or_default();
    let api: Api<Endpoints> = Api::namespaced(client.clone(), &namespace);

    let mut health = BTreeMap::new();
    for rule in gslb.spec.ingress.rules.iter().flatten() {
        let Some(host) = rule.host.clone() else {
            continue;
        };

        let mut any_healthy = false;
        let mut any_present = false;
        let paths = rule
            .http
            .as_ref()
            .map(|http| http.paths.as_slice())
            .unwrap_or_default();
        for path in paths {
            let Some(service) = path.backend.service.as_ref() else {
                continue;
            };
            match api.get(&service.name).await {
                Ok(endpoints) => {
                    any_present = true;
                    let ready = endpoints.subsets.iter().flatten().any(|subset| {
                        subset.addresses.as_ref().is_some_and(|a| !a.is_empty())
                    });
                    any_healthy = any_healthy || ready;
                }
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => {
                    debug!(service = %service.name, error = %e, "Can't read backend Endpoints");
                    any_present = true;
                }
            }
        }

        let value = if any_healthy {
            HEALTH_HEALTHY
        } else if any_present {
            HEALTH_UNHEALTHY
        } else {
            HEALTH_NOT_FOUND
        };
        health.insert(host, value.to_string());
    }
    health
}

/// Write the status subresource only when it differs from the stored one, so
/// status updates can't feed the watch back into an endless reconcile loop.
async fn update_status_if_changed(
    api: &Api<Gslb>,
    gslb: &Gslb,
    status: GslbStatus,
) -> anyhow::Result<()> {
    if gslb.status.as_ref() == Some(&status) {
        return Ok(());
    }
    let patch = json!({ "status": status });
    api.patch_status(&gslb.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .context("updating Gslb status")?;
    Ok(())
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
