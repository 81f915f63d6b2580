//! Apply engine: converge one child object at a time.
//!
//! Each object is read back first; a missing object is created, an
//! existing one is compared against the desired manifest (after carrying
//! the live resourceVersion and merging live metadata) and replaced only
//! when they differ, so a pass over an unchanged instance issues no
//! writes. Write conflicts are retried against a fresh read a bounded
//! number of times before they surface as apply failures.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manifests::{ingress::ROUTE_API_VERSION, DesiredObject};

pub const FIELD_MANAGER: &str = "opentelemetry-operator";

const CONFLICT_RETRIES: usize = 3;

/// How metadata annotations on a live object are reconciled with the
/// desired manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationPolicy {
    /// Live annotations survive unless the desired manifest overrides the
    /// same key.
    Merge,
    /// The desired annotations win wholesale, so a key dropped from the
    /// instance disappears from the object.
    Replace,
}

/// Converge a single desired object against the cluster.
pub async fn apply(client: &Client, namespace: &str, desired: &DesiredObject) -> Result<()> {
    match desired {
        DesiredObject::Deployment(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "Deployment").await
        }
        DesiredObject::DaemonSet(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "DaemonSet").await
        }
        DesiredObject::StatefulSet(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "StatefulSet").await
        }
        DesiredObject::ConfigMap(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "ConfigMap").await
        }
        DesiredObject::Service(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "Service").await
        }
        DesiredObject::ServiceAccount(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Merge, "ServiceAccount").await
        }
        DesiredObject::Ingress(o) => {
            apply_typed(&Api::namespaced(client.clone(), namespace), o, AnnotationPolicy::Replace, "Ingress").await
        }
        DesiredObject::HorizontalPodAutoscaler(o) => {
            apply_typed(
                &Api::namespaced(client.clone(), namespace),
                o,
                AnnotationPolicy::Merge,
                "HorizontalPodAutoscaler",
            )
            .await
        }
        DesiredObject::Route(manifest) => {
            let obj: DynamicObject = serde_json::from_value(manifest.clone())?;
            apply_typed(&route_api(client, namespace), &obj, AnnotationPolicy::Replace, "Route").await
        }
    }
}

pub fn route_api(client: &Client, namespace: &str) -> Api<DynamicObject> {
    let (group, version) = ROUTE_API_VERSION
        .split_once('/')
        .unwrap_or((ROUTE_API_VERSION, "v1"));
    let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, "Route"));
    Api::namespaced_with(client.clone(), namespace, &ar)
}

async fn apply_typed<K>(
    api: &Api<K>,
    desired: &K,
    policy: AnnotationPolicy,
    kind: &'static str,
) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::generation(format!("{kind} manifest carries no name")))?;

    let pp = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    let mut attempt = 0;
    loop {
        attempt += 1;
        let live = api
            .get_opt(&name)
            .await
            .map_err(|e| Error::Apply { kind, name: name.clone(), source: e })?;

        let outcome = match live {
            None => {
                debug!(kind, name = %name, "creating");
                api.create(&pp, desired).await.map(|_| ())
            }
            Some(live) => {
                let mut merged = desired.clone();
                merge_metadata(merged.meta_mut(), live.meta(), policy);
                if !needs_update(&merged, &live, policy)? {
                    debug!(kind, name = %name, "unchanged");
                    return Ok(());
                }
                debug!(kind, name = %name, "replacing");
                api.replace(&name, &pp, &merged).await.map(|_| ())
            }
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if is_conflict(&e) && attempt < CONFLICT_RETRIES => {
                debug!(kind, name = %name, attempt, "write conflict, re-reading");
                continue;
            }
            Err(e) => return Err(Error::Apply { kind, name, source: e }),
        }
    }
}

/// Decide whether the merged desired object differs from the live one.
/// Server-populated fields (status, uid, timestamps, defaulted values the
/// manifest never sets) exist only on the live side, so the desired
/// document is compared as a subset: an update is needed when any field
/// the manifest declares disagrees with the live value. Under the
/// `Replace` annotation policy, live annotations absent from the desired
/// manifest also count as drift.
fn needs_update<K: Serialize>(merged: &K, live: &K, policy: AnnotationPolicy) -> Result<bool> {
    let desired = serde_json::to_value(merged)?;
    let live = serde_json::to_value(live)?;

    if policy == AnnotationPolicy::Replace {
        let empty = serde_json::Value::Object(Default::default());
        let d = desired.pointer("/metadata/annotations").unwrap_or(&empty);
        let l = live.pointer("/metadata/annotations").unwrap_or(&empty);
        if d != l {
            return Ok(true);
        }
    }

    Ok(!subset_of(&desired, &live))
}

fn subset_of(desired: &serde_json::Value, live: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d
            .iter()
            .all(|(k, dv)| l.get(k).is_some_and(|lv| subset_of(dv, lv))),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| subset_of(dv, lv))
        }
        _ => desired == live,
    }
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Carry the live resourceVersion onto the desired metadata and fold live
/// labels/annotations underneath the desired ones. The desired manifest
/// wins on key collision; under `Replace` the live annotations are
/// dropped entirely.
pub fn merge_metadata(desired: &mut ObjectMeta, live: &ObjectMeta, policy: AnnotationPolicy) {
    desired.resource_version = live.resource_version.clone();

    if let Some(live_labels) = &live.labels {
        let mut merged = live_labels.clone();
        if let Some(desired_labels) = desired.labels.take() {
            merged.extend(desired_labels);
        }
        desired.labels = Some(merged);
    }

    if policy == AnnotationPolicy::Merge {
        if let Some(live_annotations) = &live.annotations {
            let mut merged = live_annotations.clone();
            if let Some(desired_annotations) = desired.annotations.take() {
                merged.extend(desired_annotations);
            }
            desired.annotations = Some(merged);
        }
    }
}

/// Delete by name, treating an already-absent object as success.
pub async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &kube::api::DeleteParams::default()).await {
        Ok(_) => {
            debug!(name, "pruned");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeApi(e)),
    }
}
