//! Orchestrator read API consumed by the pipeline
//!
//! The pipeline only talks to the cluster through the [`Orchestrator`] trait.
//! [`KubeOrchestrator`] backs it with the Kubernetes API; tests use the
//! in-memory `FakeOrchestrator`.

mod kubernetes;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use kubernetes::KubeOrchestrator;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeOrchestrator;

use crate::error::OrchestratorError;
use crate::models::{ReplicaSetRef, RunningInstance, WorkloadMetadata};

pub use async_trait::async_trait;

/// Captured result of a command run inside a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited successfully
    pub success: bool,
}

impl ExecOutput {
    /// Successful command with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Command that ran but exited with a failure
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

/// Read access to the cluster objects the pipeline depends on
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Fetch a Deployment's metadata
    async fn workload(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<WorkloadMetadata, OrchestratorError>;

    /// Find the ReplicaSet owning the workload's current revision
    async fn current_replica_set(
        &self,
        workload: &WorkloadMetadata,
    ) -> Result<Option<ReplicaSetRef>, OrchestratorError>;

    /// List the pods owned by a ReplicaSet
    async fn replica_set_pods(
        &self,
        replica_set: &ReplicaSetRef,
    ) -> Result<Vec<RunningInstance>, OrchestratorError>;

    /// Run a command inside a container of a pod
    async fn exec(
        &self,
        instance: &RunningInstance,
        container: &str,
        command: &[&str],
    ) -> Result<ExecOutput, OrchestratorError>;

    /// Ports exposed by the Services that select the pod, in listing order
    async fn service_ports(
        &self,
        instance: &RunningInstance,
    ) -> Result<Vec<i32>, OrchestratorError>;
}
