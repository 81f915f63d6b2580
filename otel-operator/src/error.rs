use thiserror::Error;

/// Every reconciliation failure maps to exactly one of three kinds:
/// validation (bad spec field, nothing applied), generation (spec valid but
/// incomplete for a requested feature, dependent objects skipped) or apply
/// (a write against the cluster failed).
#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported value \"{value}\" for {field}")]
    Validation { field: &'static str, value: String },

    #[error("{0}")]
    Generation(String),

    #[error("failed to apply {kind} {name}: {source}")]
    Apply {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("kubernetes api: {0}")]
    KubeApi(#[from] kube::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn generation(msg: impl Into<String>) -> Self {
        Error::Generation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
