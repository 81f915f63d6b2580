//! Deterministic child-object names derived from the instance name.
//! Every generated object's identity comes from here so that repeated
//! passes always address the same live objects.

pub fn collector(instance: &str) -> String {
    format!("{instance}-collector")
}

pub fn config_map(instance: &str) -> String {
    format!("{instance}-collector")
}

pub fn service(instance: &str) -> String {
    format!("{instance}-collector")
}

pub fn service_account(instance: &str) -> String {
    format!("{instance}-collector")
}

pub fn ingress(instance: &str) -> String {
    format!("{instance}-ingress")
}

pub fn route(receiver: &str, instance: &str) -> String {
    format!("{receiver}-{instance}-route")
}

pub fn horizontal_pod_autoscaler(instance: &str) -> String {
    format!("{instance}-collector")
}

pub fn target_allocator(instance: &str) -> String {
    format!("{instance}-targetallocator")
}

pub fn target_allocator_service_account(instance: &str) -> String {
    format!("{instance}-targetallocator")
}
