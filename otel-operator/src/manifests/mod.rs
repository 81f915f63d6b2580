//! Desired-state manifest generation.
//!
//! `build_all` is a pure function from a validated instance spec to the
//! full set of child objects for one reconciliation pass. It performs no
//! cluster I/O; the desired set is recomputed fresh every pass rather
//! than patched incrementally, so removals in the spec always propagate.

pub mod autoscaler;
pub mod collector;
pub mod ingress;
pub mod naming;
pub mod service;
pub mod ta_config;
pub mod targetallocator;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::config::OperatorConfig;
use crate::controller::validate::{IngressType, ValidatedSpec};
use crate::crd::OpenTelemetryCollector;
use crate::error::Result;

/// Key under which the collector configuration lives in its ConfigMap.
pub const COLLECTOR_CONFIG_KEY: &str = "collector.yaml";
/// Key under which the generated allocator configuration lives.
pub const ALLOCATOR_CONFIG_KEY: &str = "targetallocator.yaml";

pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

pub const MANAGED_BY: &str = "opentelemetry-operator";
pub const COMPONENT_COLLECTOR: &str = "opentelemetry-collector";
pub const COMPONENT_TARGET_ALLOCATOR: &str = "opentelemetry-targetallocator";
pub const PART_OF: &str = "opentelemetry";

/// Inputs for one generation pass: the instance, its enum-typed spec view
/// and the operator defaults (fallback images).
#[derive(Clone, Copy, Debug)]
pub struct Params<'a> {
    pub instance: &'a OpenTelemetryCollector,
    pub validated: &'a ValidatedSpec,
    pub defaults: &'a OperatorConfig,
}

impl Params<'_> {
    pub fn name(&self) -> String {
        self.instance.name_any()
    }

    pub fn namespace(&self) -> String {
        self.instance
            .namespace()
            .unwrap_or_else(|| "default".to_string())
    }
}

/// One child resource the cluster should converge to. A closed variant
/// set so the apply engine can treat identity and comparison uniformly
/// without per-kind call sites.
#[derive(Clone, Debug)]
pub enum DesiredObject {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    StatefulSet(StatefulSet),
    ConfigMap(ConfigMap),
    Service(Service),
    ServiceAccount(ServiceAccount),
    Ingress(Ingress),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    /// OpenShift Route, rendered as an unstructured manifest and applied
    /// through the dynamic API since the kind is not part of core.
    Route(serde_json::Value),
}

impl DesiredObject {
    pub fn kind(&self) -> &'static str {
        match self {
            DesiredObject::Deployment(_) => "Deployment",
            DesiredObject::DaemonSet(_) => "DaemonSet",
            DesiredObject::StatefulSet(_) => "StatefulSet",
            DesiredObject::ConfigMap(_) => "ConfigMap",
            DesiredObject::Service(_) => "Service",
            DesiredObject::ServiceAccount(_) => "ServiceAccount",
            DesiredObject::Ingress(_) => "Ingress",
            DesiredObject::HorizontalPodAutoscaler(_) => "HorizontalPodAutoscaler",
            DesiredObject::Route(_) => "Route",
        }
    }

    pub fn name(&self) -> String {
        match self {
            DesiredObject::Deployment(o) => o.name_any(),
            DesiredObject::DaemonSet(o) => o.name_any(),
            DesiredObject::StatefulSet(o) => o.name_any(),
            DesiredObject::ConfigMap(o) => o.name_any(),
            DesiredObject::Service(o) => o.name_any(),
            DesiredObject::ServiceAccount(o) => o.name_any(),
            DesiredObject::Ingress(o) => o.name_any(),
            DesiredObject::HorizontalPodAutoscaler(o) => o.name_any(),
            DesiredObject::Route(m) => m
                .pointer("/metadata/name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Build the complete desired set for one pass, in apply (dependency)
/// order: accounts and config before workloads, exposure and scaling
/// after.
pub fn build_all(params: &Params<'_>) -> Result<Vec<DesiredObject>> {
    let mut out: Vec<DesiredObject> = Vec::new();

    out.push(collector::service_account(params));
    out.push(collector::config_map(params));
    if let Some(workload) = collector::workload(params) {
        out.push(workload);
    }
    out.push(service::service(params));

    match params.validated.ingress_type {
        IngressType::None => {}
        IngressType::Ingress => {
            if let Some(ing) = ingress::ingress(params) {
                out.push(ing);
            }
        }
        IngressType::Route => out.extend(ingress::routes(params)),
    }

    if let Some(hpa) = autoscaler::horizontal_pod_autoscaler(params) {
        out.push(hpa);
    }

    // The allocator trio exists iff the feature is enabled; a generation
    // failure here (no prometheus receiver config) aborts the pass before
    // anything is applied.
    if params
        .instance
        .spec
        .target_allocator
        .as_ref()
        .is_some_and(|ta| ta.enabled)
    {
        out.extend(targetallocator::build(params)?);
    }

    Ok(out)
}

/// The four standard selector labels identifying this instance's pods.
/// Also the exact mapping the allocator config publishes as
/// `label_selector`.
pub fn selector_labels(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            LABEL_INSTANCE.to_string(),
            format!("{namespace}.{name}"),
        ),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (
            LABEL_COMPONENT.to_string(),
            COMPONENT_COLLECTOR.to_string(),
        ),
        (LABEL_PART_OF.to_string(), PART_OF.to_string()),
    ])
}

/// Standard labels merged under the instance's own labels; the instance
/// wins on key collision and user labels are never dropped. The instance
/// label is the exception: it is the identity pruning selects on, so it
/// always carries the standard `{namespace}.{name}` value.
pub fn labels(params: &Params<'_>) -> BTreeMap<String, String> {
    let mut out = selector_labels(&params.namespace(), &params.name());
    if let Some(user) = &params.instance.meta().labels {
        for (k, v) in user {
            out.insert(k.clone(), v.clone());
        }
    }
    out.insert(
        LABEL_INSTANCE.to_string(),
        format!("{}.{}", params.namespace(), params.name()),
    );
    out
}

pub fn annotations(params: &Params<'_>) -> Option<BTreeMap<String, String>> {
    params.instance.meta().annotations.clone()
}

/// Owner reference used solely for garbage-collection linkage back to the
/// instance.
pub fn owner_reference(params: &Params<'_>) -> OwnerReference {
    OwnerReference {
        api_version: OpenTelemetryCollector::api_version(&()).to_string(),
        kind: OpenTelemetryCollector::kind(&()).to_string(),
        name: params.name(),
        uid: params.instance.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Shared metadata for collector-side children.
pub fn child_meta(params: &Params<'_>, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(params.namespace()),
        labels: Some(labels(params)),
        annotations: annotations(params),
        owner_references: Some(vec![owner_reference(params)]),
        ..Default::default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{OpenTelemetryCollectorSpec, PortSpec, TargetAllocatorSpec};
    use testutil::{build_for, instance};

    fn base_spec() -> OpenTelemetryCollectorSpec {
        OpenTelemetryCollectorSpec {
            ports: vec![PortSpec {
                name: "otlp-grpc".into(),
                protocol: Some("TCP".into()),
                port: 4317,
                target_port: Some(4317),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn desired_identities_never_collide() {
        let inst = instance("test", base_spec());
        let objs = build_for(&inst).unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for o in &objs {
            assert!(
                seen.insert((o.kind(), o.name())),
                "duplicate identity {} {}",
                o.kind(),
                o.name()
            );
        }
    }

    #[test]
    fn workload_kind_follows_mode_exclusively() {
        for (mode, kind) in [
            ("deployment", "Deployment"),
            ("daemonset", "DaemonSet"),
            ("statefulset", "StatefulSet"),
        ] {
            let mut spec = base_spec();
            spec.mode = Some(mode.into());
            let objs = build_for(&instance("test", spec)).unwrap();
            let workloads: Vec<_> = objs
                .iter()
                .filter(|o| {
                    matches!(
                        o,
                        DesiredObject::Deployment(_)
                            | DesiredObject::DaemonSet(_)
                            | DesiredObject::StatefulSet(_)
                    )
                })
                .collect();
            assert_eq!(workloads.len(), 1, "mode {mode}");
            assert_eq!(workloads[0].kind(), kind);
        }
    }

    #[test]
    fn sidecar_mode_emits_no_workload() {
        let mut spec = base_spec();
        spec.mode = Some("sidecar".into());
        let objs = build_for(&instance("test", spec)).unwrap();
        assert!(!objs.iter().any(|o| {
            matches!(
                o,
                DesiredObject::Deployment(_)
                    | DesiredObject::DaemonSet(_)
                    | DesiredObject::StatefulSet(_)
            )
        }));
        // the embedded configuration still ships for the injected sidecar
        assert!(objs.iter().any(|o| o.kind() == "ConfigMap"));
    }

    #[test]
    fn allocator_objects_require_the_enabled_flag() {
        let inst = instance("test", base_spec());
        let objs = build_for(&inst).unwrap();
        assert!(!objs.iter().any(|o| o.name().contains("targetallocator")));

        let mut spec = base_spec();
        spec.target_allocator = Some(TargetAllocatorSpec {
            enabled: true,
            ..Default::default()
        });
        spec.config = Some(
            "receivers:\n  prometheus:\n    config:\n      scrape_configs: []\n".into(),
        );
        let objs = build_for(&instance("test", spec)).unwrap();
        let ta: Vec<_> = objs
            .iter()
            .filter(|o| o.name().contains("targetallocator"))
            .collect();
        assert_eq!(ta.len(), 3);
    }

    #[test]
    fn instance_labels_win_on_collision_and_are_kept() {
        let mut inst = instance("test", base_spec());
        inst.metadata.labels = Some(BTreeMap::from([
            ("something".to_string(), "great".to_string()),
            (LABEL_PART_OF.to_string(), "custom".to_string()),
        ]));
        let validated = crate::controller::validate::validate(&inst.spec).unwrap();
        let defaults = OperatorConfig::default();
        let p = Params {
            instance: &inst,
            validated: &validated,
            defaults: &defaults,
        };
        let lbls = labels(&p);
        assert_eq!(lbls.get("something").map(String::as_str), Some("great"));
        assert_eq!(lbls.get(LABEL_PART_OF).map(String::as_str), Some("custom"));
        assert_eq!(
            lbls.get(LABEL_INSTANCE).map(String::as_str),
            Some("default.test")
        );
    }

    #[test]
    fn instance_label_cannot_be_overridden() {
        let mut inst = instance("test", base_spec());
        inst.metadata.labels = Some(BTreeMap::from([(
            LABEL_INSTANCE.to_string(),
            "spoofed".to_string(),
        )]));
        let validated = crate::controller::validate::validate(&inst.spec).unwrap();
        let defaults = OperatorConfig::default();
        let p = Params {
            instance: &inst,
            validated: &validated,
            defaults: &defaults,
        };
        assert_eq!(
            labels(&p).get(LABEL_INSTANCE).map(String::as_str),
            Some("default.test")
        );
    }
}
