use envconfig::Envconfig;

/// Operator-wide defaults injected into the controller context at
/// construction, so engines with different defaults can run side by side
/// (e.g., in tests). Never read from ambient globals inside the engine.
#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Fallback collector container image when the spec omits one.
    /// Env: OTEL_OPERATOR_COLLECTOR_IMAGE
    #[envconfig(
        from = "OTEL_OPERATOR_COLLECTOR_IMAGE",
        default = "otel/opentelemetry-collector-contrib:latest"
    )]
    pub collector_image: String,

    /// Fallback target-allocator container image when the spec omits one.
    /// Env: OTEL_OPERATOR_TARGET_ALLOCATOR_IMAGE
    #[envconfig(
        from = "OTEL_OPERATOR_TARGET_ALLOCATOR_IMAGE",
        default = "ghcr.io/open-telemetry/opentelemetry-operator/target-allocator:latest"
    )]
    pub target_allocator_image: String,

    /// Steady-state requeue interval after a successful pass.
    /// Env: OTEL_OPERATOR_REQUEUE_SECS
    #[envconfig(from = "OTEL_OPERATOR_REQUEUE_SECS", default = "60")]
    pub requeue_secs: u64,

    /// Requeue delay applied by the error policy; the dispatcher layers
    /// its own backoff on repeated failures.
    /// Env: OTEL_OPERATOR_ERROR_REQUEUE_SECS
    #[envconfig(from = "OTEL_OPERATOR_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            collector_image: "otel/opentelemetry-collector-contrib:latest".into(),
            target_allocator_image:
                "ghcr.io/open-telemetry/opentelemetry-operator/target-allocator:latest".into(),
            requeue_secs: 60,
            error_requeue_secs: 30,
        }
    }
}
