use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Condition Error: {0}")]
    ConditionError(#[from] common::Error),

    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Metrics encoding Error: {0}")]
    MetricsError(#[from] std::fmt::Error),

    #[error("Stdio Error: {0}")]
    Stdio(#[from] std::io::Error),

    #[error("Missing object key {0}")]
    MissingObjectKey(&'static str),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    #[must_use]
    pub fn metric_label(&self) -> String {
        match self {
            Error::ConditionError(_) => "conditionerror",
            Error::SerializationError(_) => "serializationerror",
            Error::KubeError(_) => "kubeerror",
            Error::MetricsError(_) => "metricserror",
            Error::Stdio(_) => "stdio",
            Error::MissingObjectKey(_) => "missingobjectkey",
        }
        .to_string()
    }
}

pub static OPERATOR: &str = "imc-controller.messaging.knative.dev";

pub mod config;
pub use config::Config;

/// Reconcile pass of InMemoryChannel
pub mod inmemorychannel;

/// State machinery for kube, as exposeable to actix
pub mod manager;
pub use manager::Manager;

/// Metrics
mod metrics;
pub use metrics::Metrics;
