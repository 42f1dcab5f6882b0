// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared helpers for cluster-backed integration tests.

use gslby::crd::{Gslb, GslbSpec, Strategy};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use std::time::Duration;

/// Namespace the integration suite works in.
pub const TEST_NAMESPACE: &str = "gslby-test";

/// Poll interval while waiting for the controller to converge.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long to wait for the controller before failing an assertion.
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(120);

/// A failover Gslb with a single host rule, matching the lifecycle scenario.
pub fn failover_gslb(name: &str, host: &str) -> Gslb {
    Gslb {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        spec: GslbSpec {
            ingress: IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: "frontend-podinfo".to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(80),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..IngressSpec::default()
            },
            strategy: Strategy {
                r#type: "failover".to_string(),
                primary_geo_tag: Some("eu".to_string()),
                weight: None,
                split_brain_threshold_seconds: Some(300),
                dns_ttl_seconds: Some(30),
            },
        },
        status: None,
    }
}

/// Apply a Gslb, replacing any leftover from a previous run.
pub async fn apply_gslb(client: &Client, gslb: &Gslb) -> anyhow::Result<()> {
    let api: Api<Gslb> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = gslb.metadata.name.clone().unwrap_or_default();
    if api.get(&name).await.is_ok() {
        api.delete(&name, &DeleteParams::default()).await.ok();
        wait_until(CONVERGE_TIMEOUT, || async {
            api.get(&name).await.is_err()
        })
        .await?;
    }
    api.create(&PostParams::default(), gslb).await?;
    Ok(())
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, check: F) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if std::time::Instant::now() > deadline {
            anyhow::bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
