use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};

use super::{child_meta, naming, DesiredObject, Params};
use crate::controller::validate::Mode;

const DEFAULT_CPU_TARGET: i32 = 90;

/// One autoscaler with exactly one metric entry targeting CPU
/// utilization. Bounds are copied through verbatim so updates never leave
/// residual stale values. Only workload kinds that support scaling get
/// one.
pub fn horizontal_pod_autoscaler(params: &Params<'_>) -> Option<DesiredObject> {
    let autoscaler = params.instance.spec.autoscaler.as_ref()?;
    let max_replicas = autoscaler.max_replicas?;
    let kind = match params.validated.mode {
        Mode::Deployment | Mode::StatefulSet => params.validated.mode.workload_kind()?,
        Mode::DaemonSet | Mode::Sidecar => return None,
    };

    let target = autoscaler
        .target_cpu_utilization
        .unwrap_or(DEFAULT_CPU_TARGET);

    Some(DesiredObject::HorizontalPodAutoscaler(
        HorizontalPodAutoscaler {
            metadata: child_meta(params, naming::horizontal_pod_autoscaler(&params.name())),
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: kind.to_string(),
                    name: naming::collector(&params.name()),
                },
                min_replicas: autoscaler.min_replicas,
                max_replicas,
                metrics: Some(vec![MetricSpec {
                    type_: "Resource".to_string(),
                    resource: Some(ResourceMetricSource {
                        name: "cpu".to_string(),
                        target: MetricTarget {
                            type_: "Utilization".to_string(),
                            average_utilization: Some(target),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
    ))
}
