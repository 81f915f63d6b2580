#![allow(dead_code)]

use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::{api::Api, Client};
use tokio::task::JoinHandle;

use otel_operator::crd::OpenTelemetryCollector;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

pub async fn wait_for_deployment(ns: &str, name: &str, client: Client) -> Option<Deployment> {
    let dep_api: Api<Deployment> = Api::namespaced(client, ns);
    for _ in 0..60 {
        if let Some(d) = dep_api.get_opt(name).await.unwrap_or(None) {
            return Some(d);
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    None
}

pub async fn wait_gone<K>(api: &Api<K>, name: &str, secs: u64) -> bool
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    for _ in 0..secs {
        if api.get_opt(name).await.unwrap_or(None).is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}

pub async fn cleanup_k8s(ns: &str, name: &str, client: Client) {
    // Best-effort cleanup of the instance and every deterministic child
    let api: Api<OpenTelemetryCollector> = Api::namespaced(client.clone(), ns);
    let _ = api.delete(name, &Default::default()).await;

    let collector = format!("{name}-collector");
    let ta = format!("{name}-targetallocator");

    let dep_api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    let _ = dep_api.delete(&collector, &Default::default()).await;
    let _ = dep_api.delete(&ta, &Default::default()).await;
    let ds_api: Api<DaemonSet> = Api::namespaced(client.clone(), ns);
    let _ = ds_api.delete(&collector, &Default::default()).await;
    let sts_api: Api<StatefulSet> = Api::namespaced(client.clone(), ns);
    let _ = sts_api.delete(&collector, &Default::default()).await;
    let svc_api: Api<Service> = Api::namespaced(client.clone(), ns);
    let _ = svc_api.delete(&collector, &Default::default()).await;
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), ns);
    let _ = sa_api.delete(&collector, &Default::default()).await;
    let _ = sa_api.delete(&ta, &Default::default()).await;
    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    let _ = cm_api.delete(&collector, &Default::default()).await;
    let _ = cm_api.delete(&ta, &Default::default()).await;
}

// RAII guard to ensure controller abort + cleanup
pub struct ControllerGuard {
    ns: String,
    name: String,
    client: Client,
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(ns: &str, name: &str, client: Client) -> Self {
        Self {
            ns: ns.to_string(),
            name: name.to_string(),
            client,
            ctrl: None,
        }
    }
    pub fn with_controller(mut self, ctrl: JoinHandle<()>) -> Self {
        self.ctrl = Some(ctrl);
        self
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
        let ns = self.ns.clone();
        let name = self.name.clone();
        let client = self.client.clone();
        let _ = tokio::spawn(async move {
            cleanup_k8s(&ns, &name, client).await;
        });
    }
}

/// Spawn the controller with default config on a background task.
pub fn spawn_controller(client: Client) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cfg = otel_operator::config::OperatorConfig::default();
        let _ = otel_operator::controller::run_controller(client, cfg).await;
    })
}
