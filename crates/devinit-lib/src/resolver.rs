//! Workload resolution
//!
//! Walks Deployment -> current ReplicaSet -> pods -> container state and
//! returns the pod to introspect. Each hop is a fallible lookup; the first
//! failure ends the walk.

use crate::error::{InferError, Result};
use crate::models::{PodPhase, RunningInstance, WorkloadMetadata, WorkloadRef};
use crate::observability::PipelineLogger;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::debug;

/// A workload together with the pod currently backing it
#[derive(Debug, Clone)]
pub struct Resolved {
    pub workload: WorkloadMetadata,
    pub instance: RunningInstance,
}

/// Finds the running pod behind a Deployment
pub struct WorkloadResolver {
    orchestrator: Arc<dyn Orchestrator>,
}

impl WorkloadResolver {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn resolve(&self, workload_ref: &WorkloadRef) -> Result<Resolved> {
        let logger = PipelineLogger::new(&workload_ref.name);
        let workload = self
            .orchestrator
            .workload(&workload_ref.name, &workload_ref.namespace)
            .await?;

        let replica_set = self
            .orchestrator
            .current_replica_set(&workload)
            .await?
            .ok_or_else(|| InferError::Resolution {
                workload: workload.name.clone(),
            })?;

        let pods = self.orchestrator.replica_set_pods(&replica_set).await?;
        debug!(
            workload = %workload.name,
            replica_set = %replica_set.name,
            pods = pods.len(),
            "Listed pods of current replicaset"
        );

        let instance = pods
            .into_iter()
            .find(|pod| pod.phase == PodPhase::Running)
            .ok_or_else(|| not_running(&workload))?;

        // A running pod can still host a crash-looping container
        if !instance.is_usable(&workload_ref.container) {
            debug!(
                workload = %workload.name,
                pod = %instance.name,
                container = %workload_ref.container,
                state = ?instance.container(&workload_ref.container).map(|c| &c.state),
                "Target container is not running"
            );
            return Err(not_running(&workload));
        }

        logger.log_instance_resolved(&instance.name, &replica_set.name);
        Ok(Resolved { workload, instance })
    }
}

fn not_running(workload: &WorkloadMetadata) -> InferError {
    InferError::NotRunning {
        name: workload.name.clone(),
    }
}
