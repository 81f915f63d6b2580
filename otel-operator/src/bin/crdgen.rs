//! Prints the OpenTelemetryCollector CRD manifest to stdout, for piping
//! into `kubectl apply -f -`.

use kube::CustomResourceExt;
use otel_operator::crd::OpenTelemetryCollector;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&OpenTelemetryCollector::crd())?);
    Ok(())
}
