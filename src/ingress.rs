// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed Ingress derivation and persistence.
//!
//! Each `Gslb` embeds an ingress specification. The controller materializes
//! it as an owned Ingress with the same name and namespace, stamps the
//! strategy annotations, and keeps it converged. The strategy annotations
//! are authoritative; every other annotation a user places on the managed
//! Ingress is preserved across updates.

use crate::config::ResolvedStrategy;
use crate::constants::{ANNOTATION_PRIMARY_GEO_TAG, ANNOTATION_STRATEGY};
use crate::crd::Gslb;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What `save_ingress` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressSaveOutcome {
    /// The stored Ingress already matched
    Unchanged,
    /// A new Ingress was created
    Created,
    /// The stored Ingress was updated
    Updated,
    /// Somebody else wrote the Ingress first; retry on the next tick
    Conflict,
}

/// Derive the managed Ingress from the Gslb's embedded spec.
#[must_use]
pub fn desired_ingress(gslb: &Gslb, strategy: &ResolvedStrategy) -> Ingress {
    let mut annotations = gslb.annotations().clone();
    annotations.insert(ANNOTATION_STRATEGY.to_string(), strategy.kind.to_string());
    if let Some(primary) = &strategy.primary_geo_tag {
        annotations.insert(ANNOTATION_PRIMARY_GEO_TAG.to_string(), primary.clone());
    }

    Ingress {
        metadata: ObjectMeta {
            name: Some(gslb.name_any()),
            namespace: gslb.namespace(),
            annotations: Some(annotations),
            owner_references: gslb.controller_owner_ref(&()).map(|oref| vec![oref]),
            ..ObjectMeta::default()
        },
        spec: Some(gslb.spec.ingress.clone()),
        status: None,
    }
}

/// Create or update the managed Ingress.
///
/// An optimistic-concurrency conflict is not an error: the Ingress has been
/// modified outside the controller and the next reconcile will converge it.
///
/// # Errors
///
/// Returns the Kubernetes API error for anything other than a write conflict.
pub async fn save_ingress(
    client: &Client,
    gslb: &Gslb,
    desired: &Ingress,
) -> Result<IngressSaveOutcome, kube::Error> {
    let namespace = gslb.namespace().unwrap_or_default();
    let name = gslb.name_any();
    let api: Api<Ingress> = Api::namespaced(client.clone(), &namespace);

    let mut found = match api.get(&name).await {
        Ok(found) => found,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            info!(namespace = %namespace, ingress = %name, "Creating a new Ingress");
            return match api.create(&PostParams::default(), desired).await {
                Ok(_) => Ok(IngressSaveOutcome::Created),
                Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(IngressSaveOutcome::Conflict),
                Err(e) => Err(e),
            };
        }
        Err(e) => return Err(e),
    };

    if ingress_equal(&found, desired) {
        return Ok(IngressSaveOutcome::Unchanged);
    }

    found.spec = desired.spec.clone();
    found.metadata.annotations = Some(merge_annotations(
        found.metadata.annotations.take().unwrap_or_default(),
        desired.metadata.annotations.clone().unwrap_or_default(),
    ));

    match api.replace(&name, &PostParams::default(), &found).await {
        Ok(_) => Ok(IngressSaveOutcome::Updated),
        Err(kube::Error::Api(ae)) if ae.code == 409 => {
            warn!(
                namespace = %namespace,
                ingress = %name,
                "Ingress has been modified outside of controller, retrying reconciliation"
            );
            Ok(IngressSaveOutcome::Conflict)
        }
        Err(e) => Err(e),
    }
}

/// True when the stored Ingress already carries the desired spec and every
/// desired annotation.
fn ingress_equal(current: &Ingress, desired: &Ingress) -> bool {
    let current_annotations = current.metadata.annotations.clone().unwrap_or_default();
    for (key, value) in desired.metadata.annotations.clone().unwrap_or_default() {
        if current_annotations.get(&key) != Some(&value) {
            return false;
        }
    }
    current.spec == desired.spec
}

/// Merge annotation maps; desired entries win, everything else is preserved.
fn merge_annotations(
    current: BTreeMap<String, String>,
    desired: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = current;
    merged.extend(desired);
    merged
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
