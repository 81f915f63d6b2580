//! Configuration adapter: turns the collector's embedded scrape
//! configuration into the companion allocator configuration document.
//!
//! The output must be byte-identical across repeated generations for the
//! same input, otherwise the apply engine would see spurious diffs and
//! churn the ConfigMap on every pass. serde_yaml mappings serialize in
//! insertion order, so the document is assembled key by key.

use serde_yaml::{Mapping, Value};

use crate::crd::OpenTelemetryCollectorSpec;
use crate::error::{Error, Result};
use crate::manifests::{
    COMPONENT_COLLECTOR, LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_PART_OF,
    MANAGED_BY, PART_OF,
};

pub const ERR_NO_PROMETHEUS: &str = "no prometheus available as part of the configuration";

const DEFAULT_ALLOCATION_STRATEGY: &str = "least-weighted";
const DEFAULT_SCRAPE_INTERVAL: &str = "30s";

/// Locate the prometheus receiver's `config` sub-document inside the
/// collector configuration. The receiver key may carry a component
/// qualifier (`prometheus/name`), as collector configs allow.
pub fn extract_prometheus_config(config: &str) -> Result<Value> {
    let doc: Value = serde_yaml::from_str(config)
        .map_err(|e| Error::generation(format!("invalid collector configuration: {e}")))?;

    let receivers = doc
        .get("receivers")
        .and_then(Value::as_mapping)
        .ok_or_else(|| Error::generation(ERR_NO_PROMETHEUS))?;

    let receiver = receivers
        .get("prometheus")
        .or_else(|| {
            receivers.iter().find_map(|(k, v)| {
                k.as_str()
                    .filter(|k| k.starts_with("prometheus/"))
                    .map(|_| v)
            })
        })
        .ok_or_else(|| Error::generation(ERR_NO_PROMETHEUS))?;

    receiver
        .get("config")
        .cloned()
        .ok_or_else(|| Error::generation(ERR_NO_PROMETHEUS))
}

/// Build the allocator configuration document for one instance. Fixed
/// four-key layout, serialized in a fixed order: `label_selector`,
/// `config`, `allocation_strategy`, `prometheus_cr`.
pub fn build_allocator_config(
    namespace: &str,
    name: &str,
    spec: &OpenTelemetryCollectorSpec,
) -> Result<String> {
    let prom_config = extract_prometheus_config(
        spec.config
            .as_deref()
            .ok_or_else(|| Error::generation(ERR_NO_PROMETHEUS))?,
    )?;

    let ta = spec.target_allocator.as_ref();
    let strategy = ta
        .and_then(|t| t.allocation_strategy.as_deref())
        .unwrap_or(DEFAULT_ALLOCATION_STRATEGY);
    let scrape_interval = ta
        .and_then(|t| t.prometheus_cr.as_ref())
        .and_then(|p| p.scrape_interval.as_deref())
        .unwrap_or(DEFAULT_SCRAPE_INTERVAL);

    let mut label_selector = Mapping::new();
    label_selector.insert(
        Value::from(LABEL_INSTANCE),
        Value::from(format!("{namespace}.{name}")),
    );
    label_selector.insert(Value::from(LABEL_MANAGED_BY), Value::from(MANAGED_BY));
    label_selector.insert(Value::from(LABEL_COMPONENT), Value::from(COMPONENT_COLLECTOR));
    label_selector.insert(Value::from(LABEL_PART_OF), Value::from(PART_OF));

    let mut prometheus_cr = Mapping::new();
    prometheus_cr.insert(Value::from("scrape_interval"), Value::from(scrape_interval));

    let mut root = Mapping::new();
    root.insert(Value::from("label_selector"), Value::Mapping(label_selector));
    root.insert(Value::from("config"), prom_config);
    root.insert(Value::from("allocation_strategy"), Value::from(strategy));
    root.insert(Value::from("prometheus_cr"), Value::Mapping(prometheus_cr));

    serde_yaml::to_string(&Value::Mapping(root))
        .map_err(|e| Error::generation(format!("serializing allocator configuration: {e}")))
}
