//! End-to-end inference: resolve, probe, synthesize

use crate::error::Result;
use crate::introspect::{ProbePlan, RuntimeIntrospector};
use crate::models::{DevDescriptor, WorkloadRef};
use crate::observability::PipelineLogger;
use crate::orchestrator::Orchestrator;
use crate::resolver::WorkloadResolver;
use crate::synth::{synthesize, SynthesisInput};
use std::sync::Arc;

/// Infers dev descriptors from running workloads
///
/// Holds no state between calls; every call resolves the pod afresh.
#[derive(Clone)]
pub struct DevInference {
    orchestrator: Arc<dyn Orchestrator>,
}

impl DevInference {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Fill the unset fields of `dev` from the live workload
    ///
    /// Resolution errors abort before any probe runs. On error `dev` is left
    /// untouched.
    pub async fn infer(&self, workload_ref: &WorkloadRef, dev: &mut DevDescriptor) -> Result<()> {
        let logger = PipelineLogger::new(&workload_ref.name);

        let resolved = WorkloadResolver::new(self.orchestrator.clone())
            .resolve(workload_ref)
            .await?;

        let facts = RuntimeIntrospector::new(self.orchestrator.clone(), logger.clone())
            .probe(
                &resolved.instance,
                &workload_ref.container,
                ProbePlan::for_descriptor(dev),
            )
            .await?;

        let mut merged = dev.clone();
        synthesize(
            &mut merged,
            &SynthesisInput {
                workload: &resolved.workload,
                instance: &resolved.instance,
                facts: &facts,
                logger: &logger,
            },
        )?;
        *dev = merged;

        logger.log_inference_completed(dev.forward.len());
        Ok(())
    }
}

/// Convenience wrapper building a fresh descriptor
pub async fn infer_dev(
    orchestrator: Arc<dyn Orchestrator>,
    workload_ref: &WorkloadRef,
) -> Result<DevDescriptor> {
    let mut dev = DevDescriptor::new();
    DevInference::new(orchestrator)
        .infer(workload_ref, &mut dev)
        .await?;
    Ok(dev)
}
