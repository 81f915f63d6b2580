use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{child_meta, naming, selector_labels, DesiredObject, Params};

/// The collector Service, regenerated from the declared ports on every
/// pass; ports removed from the spec disappear from the next desired set.
pub fn service(params: &Params<'_>) -> DesiredObject {
    let ports: Vec<ServicePort> = params
        .instance
        .spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(p.name.clone()),
            protocol: p.protocol.clone(),
            port: p.port,
            target_port: Some(IntOrString::Int(p.target_port.unwrap_or(p.port))),
            ..Default::default()
        })
        .collect();

    DesiredObject::Service(Service {
        metadata: child_meta(params, naming::service(&params.name())),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&params.namespace(), &params.name())),
            ports: if ports.is_empty() { None } else { Some(ports) },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{build_for, instance};
    use super::*;
    use crate::crd::{OpenTelemetryCollectorSpec, PortSpec};

    fn find_service(objs: &[DesiredObject]) -> &Service {
        objs.iter()
            .find_map(|o| match o {
                DesiredObject::Service(s) => Some(s),
                _ => None,
            })
            .expect("service")
    }

    fn spec_with_ports(names: &[(&str, i32)]) -> OpenTelemetryCollectorSpec {
        OpenTelemetryCollectorSpec {
            ports: names
                .iter()
                .map(|(n, p)| PortSpec {
                    name: (*n).into(),
                    protocol: Some("TCP".into()),
                    port: *p,
                    target_port: Some(*p),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn service_reflects_all_declared_ports() {
        let objs = build_for(&instance("test", spec_with_ports(&[("otlp-grpc", 4317)]))).unwrap();
        let ports = find_service(&objs).spec.as_ref().unwrap().ports.as_ref().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("otlp-grpc"));
        assert_eq!(ports[0].port, 4317);
    }

    #[test]
    fn appended_port_appears_and_removed_port_disappears() {
        let grown = build_for(&instance(
            "test",
            spec_with_ports(&[("otlp-grpc", 4317), ("port-web", 8080)]),
        ))
        .unwrap();
        let ports = find_service(&grown).spec.as_ref().unwrap().ports.as_ref().unwrap();
        assert!(ports.iter().any(|p| p.name.as_deref() == Some("port-web")));

        // the desired object is recomputed, never patched incrementally
        let shrunk = build_for(&instance("test", spec_with_ports(&[("otlp-grpc", 4317)]))).unwrap();
        let ports = find_service(&shrunk).spec.as_ref().unwrap().ports.as_ref().unwrap();
        assert!(!ports.iter().any(|p| p.name.as_deref() == Some("port-web")));
    }
}
