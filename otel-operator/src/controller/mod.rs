//! Reconciliation engine for `OpenTelemetryCollector` instances.
//!
//! Each pass recomputes the full desired set from the instance spec,
//! converges every child in dependency order, prunes children whose
//! deterministic names are no longer desired, and publishes the outcome
//! on the instance status. Passes are level-triggered: a failed pass is
//! retried by the error policy, a clean one re-queued at the steady
//! interval.

pub mod apply;
pub mod status;
pub mod validate;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::OpenTelemetryCollector;
use crate::error::{Error, Result};
use crate::manifests::{self, naming, DesiredObject, Params, LABEL_INSTANCE};

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
}

/// Run the controller until the watch stream ends.
pub async fn run_controller(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let api: Api<OpenTelemetryCollector> = Api::all(client.clone());
    let ctx = Arc::new(ControllerContext { client, cfg });

    Controller::new(api, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = %e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(
    obj: Arc<OpenTelemetryCollector>,
    ctx: Arc<ControllerContext>,
) -> Result<Action> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    // Children carry owner references; deletion is left to garbage
    // collection.
    if obj.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    match run_pass(&obj, &ctx, &namespace).await {
        Ok(applied) => {
            publish_status(&obj, &ctx, &namespace, &name, status::ready(obj.meta().generation, applied))
                .await;
            Ok(Action::requeue(Duration::from_secs(ctx.cfg.requeue_secs)))
        }
        Err(e) => {
            warn!(name = %name, error = %e, "reconciliation pass failed");
            publish_status(&obj, &ctx, &namespace, &name, status::degraded(obj.meta().generation, &e))
                .await;
            Err(e)
        }
    }
}

/// One full pass: validate, generate, apply in order, prune. Returns the
/// number of applied objects.
async fn run_pass(
    obj: &OpenTelemetryCollector,
    ctx: &ControllerContext,
    namespace: &str,
) -> Result<usize> {
    let validated = validate::validate(&obj.spec)?;
    let desired = manifests::build_all(&Params {
        instance: obj,
        validated: &validated,
        defaults: &ctx.cfg,
    })?;

    // Apply the whole set even when one object fails, so a transient
    // failure in the middle does not leave later children stale; the
    // first error still fails the pass.
    let mut first_err: Option<Error> = None;
    for object in &desired {
        if let Err(e) = apply::apply(&ctx.client, namespace, object).await {
            warn!(kind = object.kind(), name = %object.name(), error = %e, "apply failed");
            first_err.get_or_insert(e);
        }
    }

    prune(ctx, namespace, &obj.name_any(), &desired).await;

    match first_err {
        Some(e) => Err(e),
        None => Ok(desired.len()),
    }
}

/// Delete previously-generated children whose identities are absent from
/// the current desired set. Owner references only collect children after
/// the instance is gone; a mode switch or a disabled feature has to prune
/// explicitly. Deterministic names make this a fixed candidate list, plus
/// a label-selected listing for Routes whose names embed the port.
async fn prune(ctx: &ControllerContext, namespace: &str, name: &str, desired: &[DesiredObject]) {
    let wanted: BTreeSet<(&'static str, String)> =
        desired.iter().map(|o| (o.kind(), o.name())).collect();
    let gone = |kind: &'static str, candidate: &str| {
        !wanted.contains(&(kind, candidate.to_string()))
    };

    let client = &ctx.client;
    let collector = naming::collector(name);
    let ta = naming::target_allocator(name);

    if gone("Deployment", &collector) {
        prune_one::<Deployment>(client, namespace, &collector).await;
    }
    if gone("DaemonSet", &collector) {
        prune_one::<DaemonSet>(client, namespace, &collector).await;
    }
    if gone("StatefulSet", &collector) {
        prune_one::<StatefulSet>(client, namespace, &collector).await;
    }
    let ingress = naming::ingress(name);
    if gone("Ingress", &ingress) {
        prune_one::<Ingress>(client, namespace, &ingress).await;
    }
    let hpa = naming::horizontal_pod_autoscaler(name);
    if gone("HorizontalPodAutoscaler", &hpa) {
        prune_one::<HorizontalPodAutoscaler>(client, namespace, &hpa).await;
    }
    if gone("Deployment", &ta) {
        prune_one::<Deployment>(client, namespace, &ta).await;
    }
    if gone("ConfigMap", &ta) {
        prune_one::<ConfigMap>(client, namespace, &ta).await;
    }
    let ta_sa = naming::target_allocator_service_account(name);
    if gone("ServiceAccount", &ta_sa) {
        prune_one::<ServiceAccount>(client, namespace, &ta_sa).await;
    }

    prune_routes(ctx, namespace, name, &wanted).await;
}

async fn prune_one<K>(client: &Client, namespace: &str, name: &str)
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = apply::delete_if_exists(&api, name).await {
        warn!(name, error = %e, "prune failed");
    }
}

/// Route names embed the receiver port, so stale ones are found by
/// listing the instance's Routes and dropping any name the desired set
/// does not carry. A cluster without the Route API simply has nothing to
/// list.
async fn prune_routes(
    ctx: &ControllerContext,
    namespace: &str,
    name: &str,
    wanted: &BTreeSet<(&'static str, String)>,
) {
    let api = apply::route_api(&ctx.client, namespace);
    let lp = ListParams::default()
        .labels(&format!("{LABEL_INSTANCE}={namespace}.{name}"));
    let live = match api.list(&lp).await {
        Ok(list) => list,
        Err(e) => {
            debug!(error = %e, "route listing unavailable, skipping route prune");
            return;
        }
    };
    for route in live {
        let route_name = route.name_any();
        if !wanted.contains(&("Route", route_name.clone())) {
            if let Err(e) = apply::delete_if_exists(&api, &route_name).await {
                warn!(name = %route_name, error = %e, "route prune failed");
            }
        }
    }
}

/// Merge-patch the instance status, folding new conditions over the
/// existing set. Status publication is best-effort; a failed patch never
/// masks the pass outcome.
async fn publish_status(
    obj: &OpenTelemetryCollector,
    ctx: &ControllerContext,
    namespace: &str,
    name: &str,
    mut next: crate::crd::OpenTelemetryCollectorStatus,
) {
    next.conditions = Some(status::merge_conditions(
        obj.status.as_ref().and_then(|s| s.conditions.as_ref()),
        next.conditions.unwrap_or_default(),
    ));
    let api: Api<OpenTelemetryCollector> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = json!({ "status": next });
    if let Err(e) = api
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        warn!(name, error = %e, "status update failed");
    }
}

fn error_policy(
    _obj: Arc<OpenTelemetryCollector>,
    _error: &Error,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(ctx.cfg.error_requeue_secs))
}
