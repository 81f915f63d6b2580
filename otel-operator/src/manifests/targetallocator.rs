//! Target-allocator children: Deployment, ServiceAccount and the config
//! document produced by the adapter. Generated if and only if
//! `spec.target_allocator.enabled`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
    ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::{
    annotations, naming, owner_reference, selector_labels, ta_config, DesiredObject, Params,
    ALLOCATOR_CONFIG_KEY, COMPONENT_TARGET_ALLOCATOR, LABEL_COMPONENT,
};
use crate::error::Result;

const CONTAINER_NAME: &str = "ta-container";
const CONFIG_MOUNT_PATH: &str = "/conf";
const HTTP_PORT: i32 = 8080;

pub fn build(params: &Params<'_>) -> Result<Vec<DesiredObject>> {
    // The adapter runs first so a missing scrape configuration aborts
    // before any allocator object enters the desired set.
    let allocator_config =
        ta_config::build_allocator_config(&params.namespace(), &params.name(), &params.instance.spec)?;

    Ok(vec![
        service_account(params),
        config_map(params, allocator_config),
        deployment(params),
    ])
}

fn labels(params: &Params<'_>) -> BTreeMap<String, String> {
    let mut out = super::labels(params);
    out.insert(
        LABEL_COMPONENT.to_string(),
        COMPONENT_TARGET_ALLOCATOR.to_string(),
    );
    out
}

fn meta(params: &Params<'_>, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(params.namespace()),
        labels: Some(labels(params)),
        annotations: annotations(params),
        owner_references: Some(vec![owner_reference(params)]),
        ..Default::default()
    }
}

fn service_account(params: &Params<'_>) -> DesiredObject {
    DesiredObject::ServiceAccount(ServiceAccount {
        metadata: meta(
            params,
            naming::target_allocator_service_account(&params.name()),
        ),
        ..Default::default()
    })
}

fn config_map(params: &Params<'_>, allocator_config: String) -> DesiredObject {
    let mut data = BTreeMap::new();
    data.insert(ALLOCATOR_CONFIG_KEY.to_string(), allocator_config);
    DesiredObject::ConfigMap(ConfigMap {
        metadata: meta(params, naming::target_allocator(&params.name())),
        data: Some(data),
        ..Default::default()
    })
}

fn deployment(params: &Params<'_>) -> DesiredObject {
    let name = params.name();
    let ta_name = naming::target_allocator(&name);
    let image = params
        .instance
        .spec
        .target_allocator
        .as_ref()
        .and_then(|ta| ta.image.clone())
        .unwrap_or_else(|| params.defaults.target_allocator_image.clone());

    let mut selector = selector_labels(&params.namespace(), &name);
    selector.insert(
        LABEL_COMPONENT.to_string(),
        COMPONENT_TARGET_ALLOCATOR.to_string(),
    );

    DesiredObject::Deployment(Deployment {
        metadata: meta(params, ta_name.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(naming::target_allocator_service_account(&name)),
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(image),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: HTTP_PORT,
                            ..Default::default()
                        }]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "ta-internal".to_string(),
                            mount_path: CONFIG_MOUNT_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "ta-internal".to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: ta_name,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{build_for, instance};
    use super::*;
    use crate::crd::{OpenTelemetryCollectorSpec, TargetAllocatorSpec};
    use crate::error::Error;

    const PROM_CONFIG: &str =
        "receivers:\n  prometheus:\n    config:\n      scrape_configs: []\n";

    fn spec(enabled: bool, config: Option<&str>) -> OpenTelemetryCollectorSpec {
        OpenTelemetryCollectorSpec {
            mode: Some("statefulset".into()),
            target_allocator: Some(TargetAllocatorSpec {
                enabled,
                image: Some("something:tag".into()),
                ..Default::default()
            }),
            config: config.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn enabled_emits_deployment_config_and_account() {
        let objs = build_for(&instance("test", spec(true, Some(PROM_CONFIG)))).unwrap();
        let ta: Vec<_> = objs
            .iter()
            .filter(|o| o.name().starts_with("test-targetallocator"))
            .collect();
        let kinds: Vec<_> = ta.iter().map(|o| o.kind()).collect();
        assert_eq!(ta.len(), 3);
        assert!(kinds.contains(&"Deployment"));
        assert!(kinds.contains(&"ConfigMap"));
        assert!(kinds.contains(&"ServiceAccount"));
    }

    #[test]
    fn disabled_emits_none_even_with_prior_state() {
        let objs = build_for(&instance("test", spec(false, Some(PROM_CONFIG)))).unwrap();
        assert!(!objs.iter().any(|o| o.name().contains("targetallocator")));
    }

    #[test]
    fn enabled_without_scrape_config_fails_generation() {
        let err = build_for(&instance("test", spec(true, None))).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
        assert!(err
            .to_string()
            .contains("no prometheus available as part of the configuration"));
    }

    #[test]
    fn allocator_image_comes_from_spec_or_default() {
        let objs = build_for(&instance("test", spec(true, Some(PROM_CONFIG)))).unwrap();
        let dep = objs
            .iter()
            .find_map(|o| match o {
                DesiredObject::Deployment(d)
                    if d.metadata.name.as_deref() == Some("test-targetallocator") =>
                {
                    Some(d)
                }
                _ => None,
            })
            .unwrap();
        let image = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .image
            .as_deref();
        assert_eq!(image, Some("something:tag"));
    }

    #[test]
    fn config_map_payload_sits_under_the_wellknown_key() {
        let objs = build_for(&instance("test", spec(true, Some(PROM_CONFIG)))).unwrap();
        let cm = objs
            .iter()
            .find_map(|o| match o {
                DesiredObject::ConfigMap(c)
                    if c.metadata.name.as_deref() == Some("test-targetallocator") =>
                {
                    Some(c)
                }
                _ => None,
            })
            .unwrap();
        let payload = cm.data.as_ref().unwrap().get(ALLOCATOR_CONFIG_KEY).unwrap();
        assert!(payload.contains("label_selector"));
        assert!(payload.contains("least-weighted"));
    }
}
