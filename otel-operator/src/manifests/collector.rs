//! Collector-side children: ServiceAccount, ConfigMap and the workload
//! selected by `spec.mode`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
    ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{
    child_meta, naming, selector_labels, DesiredObject, Params, COLLECTOR_CONFIG_KEY,
};
use crate::controller::validate::Mode;

const CONTAINER_NAME: &str = "otc-container";
const CONFIG_MOUNT_PATH: &str = "/conf";

pub fn service_account(params: &Params<'_>) -> DesiredObject {
    DesiredObject::ServiceAccount(ServiceAccount {
        metadata: child_meta(params, naming::service_account(&params.name())),
        ..Default::default()
    })
}

/// The collector configuration document, shipped verbatim under a fixed
/// well-known key and mounted into the collector container.
pub fn config_map(params: &Params<'_>) -> DesiredObject {
    let mut data = BTreeMap::new();
    data.insert(
        COLLECTOR_CONFIG_KEY.to_string(),
        params.instance.spec.config.clone().unwrap_or_default(),
    );
    DesiredObject::ConfigMap(ConfigMap {
        metadata: child_meta(params, naming::config_map(&params.name())),
        data: Some(data),
        ..Default::default()
    })
}

/// Exactly one workload kind per mode; sidecar mode emits none because
/// the collector rides inside user pods.
pub fn workload(params: &Params<'_>) -> Option<DesiredObject> {
    let name = params.name();
    let meta = child_meta(params, naming::collector(&name));
    let selector = LabelSelector {
        match_labels: Some(selector_labels(&params.namespace(), &name)),
        ..Default::default()
    };
    let template = pod_template(params);

    match params.validated.mode {
        Mode::Deployment => Some(DesiredObject::Deployment(Deployment {
            metadata: meta,
            spec: Some(DeploymentSpec {
                replicas: params.instance.spec.replicas,
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        })),
        Mode::DaemonSet => Some(DesiredObject::DaemonSet(DaemonSet {
            metadata: meta,
            spec: Some(DaemonSetSpec {
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        })),
        Mode::StatefulSet => Some(DesiredObject::StatefulSet(StatefulSet {
            metadata: meta,
            spec: Some(StatefulSetSpec {
                replicas: params.instance.spec.replicas,
                selector,
                service_name: Some(naming::service(&name)),
                pod_management_policy: Some("Parallel".to_string()),
                template,
                ..Default::default()
            }),
            ..Default::default()
        })),
        Mode::Sidecar => None,
    }
}

fn pod_template(params: &Params<'_>) -> PodTemplateSpec {
    let name = params.name();
    let image = params
        .instance
        .spec
        .image
        .clone()
        .unwrap_or_else(|| params.defaults.collector_image.clone());

    let ports: Vec<ContainerPort> = params
        .instance
        .spec
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.target_port.unwrap_or(p.port),
            protocol: p.protocol.clone(),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image),
        args: Some(vec![format!(
            "--config={CONFIG_MOUNT_PATH}/{COLLECTOR_CONFIG_KEY}"
        )]),
        ports: if ports.is_empty() { None } else { Some(ports) },
        volume_mounts: Some(vec![VolumeMount {
            name: "otc-internal".to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    // Template labels must stay exactly the selector set; instance label
    // overrides belong on the workload metadata, not in the selector
    // contract.
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(selector_labels(&params.namespace(), &name)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(naming::service_account(&name)),
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: "otc-internal".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: naming::config_map(&name),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}
