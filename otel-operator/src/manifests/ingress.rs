//! Exposure objects: a networking/v1 Ingress, or one OpenShift Route per
//! receiver port. Routes are out-of-tree kinds, so they render as
//! unstructured manifests for the dynamic API.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;

use super::{labels, naming, owner_reference, DesiredObject, Params};

pub const ROUTE_API_VERSION: &str = "route.openshift.io/v1";
pub const ROUTE_KIND: &str = "Route";

/// One Ingress with a single rule; its annotations come from the spec
/// verbatim (replaced, not merged, so removals stick) and its host is
/// unrestricted when no hostname is declared. No ports means no paths to
/// route, and a rule with an empty path list is rejected by the API
/// server, so nothing is generated.
pub fn ingress(params: &Params<'_>) -> Option<DesiredObject> {
    let name = params.name();
    let spec_ingress = params.instance.spec.ingress.as_ref()?;
    if params.instance.spec.ports.is_empty() {
        return None;
    }
    let service_name = naming::service(&name);

    let paths: Vec<HTTPIngressPath> = params
        .instance
        .spec
        .ports
        .iter()
        .map(|p| HTTPIngressPath {
            path: Some(format!("/{}", p.name)),
            path_type: "Prefix".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: service_name.clone(),
                    port: Some(ServiceBackendPort {
                        name: Some(p.name.clone()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
        })
        .collect();

    let host = spec_ingress
        .hostname
        .clone()
        .filter(|h| !h.is_empty());

    Some(DesiredObject::Ingress(Ingress {
        metadata: ObjectMeta {
            name: Some(naming::ingress(&name)),
            namespace: Some(params.namespace()),
            labels: Some(labels(params)),
            annotations: spec_ingress.annotations.clone(),
            owner_references: Some(vec![owner_reference(params)]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host,
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

/// One Route per exposed receiver port, named `{receiver}-{instance}-route`.
/// Host is `{receiver}.{hostname}` when a hostname is declared, otherwise
/// the cluster assigns its default.
pub fn routes(params: &Params<'_>) -> Vec<DesiredObject> {
    let name = params.name();
    let namespace = params.namespace();
    let hostname = params
        .instance
        .spec
        .ingress
        .as_ref()
        .and_then(|i| i.hostname.clone())
        .filter(|h| !h.is_empty());
    let service_name = naming::service(&name);
    let lbls = labels(params);
    let owner = owner_reference(params);

    params
        .instance
        .spec
        .ports
        .iter()
        .map(|p| {
            let mut spec = json!({
                "port": { "targetPort": p.name },
                "to": { "kind": "Service", "name": service_name },
                "wildcardPolicy": "None",
            });
            if let Some(h) = &hostname {
                spec["host"] = json!(format!("{}.{h}", p.name));
            }
            if let Some(termination) = params.validated.termination.as_tls_termination() {
                spec["tls"] = json!({ "termination": termination });
            }
            DesiredObject::Route(json!({
                "apiVersion": ROUTE_API_VERSION,
                "kind": ROUTE_KIND,
                "metadata": {
                    "name": naming::route(&p.name, &name),
                    "namespace": namespace,
                    "labels": lbls,
                    "ownerReferences": [owner],
                },
                "spec": spec,
            }))
        })
        .collect()
}
