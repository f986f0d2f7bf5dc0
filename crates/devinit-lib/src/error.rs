//! Error types for the inference pipeline

use thiserror::Error;

/// Failures reported by an [`Orchestrator`](crate::orchestrator::Orchestrator)
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("exec in {pod}/{container} failed: {message}")]
    Exec {
        pod: String,
        container: String,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced to callers of the pipeline
///
/// Best-effort probe failures never appear here; they are logged and replaced
/// by fallbacks.
#[derive(Debug, Error)]
pub enum InferError {
    /// No ReplicaSet owns the workload's current generation
    #[error("no replicaset found for deployment '{workload}'")]
    Resolution { workload: String },

    /// No running pod, or the target container is not running
    #[error("no pod is running for deployment '{name}'")]
    NotRunning { name: String },

    /// The declared ports of the pod could not be read
    #[error("failed to get ports for pod '{pod}': {source}")]
    Ports {
        pod: String,
        #[source]
        source: OrchestratorError,
    },

    /// No free local port is left to forward the remote port
    #[error("no free local port available to forward remote port {remote}")]
    PortExhausted { remote: u16 },

    #[error(transparent)]
    Api(#[from] OrchestratorError),
}

pub type Result<T, E = InferError> = std::result::Result<T, E>;
