use crate::crd::OpenTelemetryCollectorSpec;
use crate::error::{Error, Result};

/// Workload topology selected by `spec.mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Deployment,
    DaemonSet,
    StatefulSet,
    Sidecar,
}

impl Mode {
    pub fn workload_kind(&self) -> Option<&'static str> {
        match self {
            Mode::Deployment => Some("Deployment"),
            Mode::DaemonSet => Some("DaemonSet"),
            Mode::StatefulSet => Some("StatefulSet"),
            Mode::Sidecar => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressType {
    None,
    Ingress,
    Route,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteTermination {
    Insecure,
    Edge,
    Passthrough,
    Reencrypt,
}

impl RouteTermination {
    /// OpenShift spelling of the termination policy; None means the route
    /// carries no TLS stanza at all.
    pub fn as_tls_termination(&self) -> Option<&'static str> {
        match self {
            RouteTermination::Insecure => None,
            RouteTermination::Edge => Some("edge"),
            RouteTermination::Passthrough => Some("passthrough"),
            RouteTermination::Reencrypt => Some("reencrypt"),
        }
    }
}

/// Enum-typed view of the free-string spec fields. Producing this is the
/// validation step: it runs before any child object is built, and a bad
/// value fails with the field and value named.
#[derive(Clone, Copy, Debug)]
pub struct ValidatedSpec {
    pub mode: Mode,
    pub ingress_type: IngressType,
    pub termination: RouteTermination,
}

pub fn validate(spec: &OpenTelemetryCollectorSpec) -> Result<ValidatedSpec> {
    let mode = match spec.mode.as_deref().unwrap_or("deployment") {
        "" | "deployment" => Mode::Deployment,
        "daemonset" => Mode::DaemonSet,
        "statefulset" => Mode::StatefulSet,
        "sidecar" => Mode::Sidecar,
        other => {
            return Err(Error::Validation {
                field: "spec.mode",
                value: other.to_string(),
            });
        }
    };

    let ingress_type = match spec
        .ingress
        .as_ref()
        .and_then(|i| i.ingress_type.as_deref())
        .unwrap_or("")
    {
        "" => IngressType::None,
        "ingress" => IngressType::Ingress,
        "route" => IngressType::Route,
        other => {
            return Err(Error::Validation {
                field: "spec.ingress.type",
                value: other.to_string(),
            });
        }
    };

    let termination = match spec
        .ingress
        .as_ref()
        .and_then(|i| i.route.as_ref())
        .and_then(|r| r.termination.as_deref())
        .unwrap_or("")
    {
        "" | "insecure" => RouteTermination::Insecure,
        "edge" => RouteTermination::Edge,
        "passthrough" => RouteTermination::Passthrough,
        "reencrypt" => RouteTermination::Reencrypt,
        other => {
            return Err(Error::Validation {
                field: "spec.ingress.route.termination",
                value: other.to_string(),
            });
        }
    };

    Ok(ValidatedSpec {
        mode,
        ingress_type,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{IngressSpec, RouteSpec};

    fn spec_with_mode(mode: &str) -> OpenTelemetryCollectorSpec {
        OpenTelemetryCollectorSpec {
            mode: Some(mode.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn mode_defaults_to_deployment() {
        let v = validate(&OpenTelemetryCollectorSpec::default()).unwrap();
        assert_eq!(v.mode, Mode::Deployment);
        assert_eq!(v.ingress_type, IngressType::None);
    }

    #[test]
    fn all_known_modes_parse() {
        for (s, m) in [
            ("deployment", Mode::Deployment),
            ("daemonset", Mode::DaemonSet),
            ("statefulset", Mode::StatefulSet),
            ("sidecar", Mode::Sidecar),
        ] {
            assert_eq!(validate(&spec_with_mode(s)).unwrap().mode, m);
        }
    }

    #[test]
    fn bad_mode_is_named_in_the_error() {
        let err = validate(&spec_with_mode("bad")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"bad\""), "got: {msg}");
        assert!(msg.contains("spec.mode"), "got: {msg}");
    }

    #[test]
    fn bad_ingress_type_is_rejected() {
        let spec = OpenTelemetryCollectorSpec {
            ingress: Some(IngressSpec {
                ingress_type: Some("loadbalancer".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let msg = validate(&spec).unwrap_err().to_string();
        assert!(msg.contains("spec.ingress.type"), "got: {msg}");
        assert!(msg.contains("loadbalancer"), "got: {msg}");
    }

    #[test]
    fn route_termination_parses_and_rejects() {
        let mut spec = OpenTelemetryCollectorSpec {
            ingress: Some(IngressSpec {
                ingress_type: Some("route".into()),
                route: Some(RouteSpec {
                    termination: Some("edge".into()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            validate(&spec).unwrap().termination,
            RouteTermination::Edge
        );

        spec.ingress.as_mut().unwrap().route = Some(RouteSpec {
            termination: Some("plaintext".into()),
        });
        assert!(validate(&spec).is_err());
    }
}
