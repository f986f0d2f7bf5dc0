//! Structured logging for the inference pipeline
//!
//! Every event carries the workload name so interleaved runs stay readable
//! in JSON log output.

use tracing::{debug, info, warn};

/// Emits named pipeline events for one workload
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    pub(crate) workload: String,
}

impl PipelineLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    pub fn log_instance_resolved(&self, pod: &str, replica_set: &str) {
        info!(
            event = "instance_resolved",
            workload = %self.workload,
            pod = %pod,
            replica_set = %replica_set,
            "Resolved running pod"
        );
    }

    /// Soft probe failures are informational: a fallback takes over
    pub fn log_probe_failed(&self, probe: &str, pod: &str, error: &str) {
        info!(
            event = "probe_failed",
            workload = %self.workload,
            probe = %probe,
            pod = %pod,
            error = %error,
            "error getting {} of the deployment", probe
        );
    }

    pub fn log_probe_observed(&self, probe: &str, value: &str) {
        debug!(
            event = "probe_observed",
            workload = %self.workload,
            probe = %probe,
            value = %value,
            "Probe succeeded"
        );
    }

    pub fn log_rule_applied(&self, rule: &str) {
        debug!(
            event = "rule_applied",
            workload = %self.workload,
            rule = %rule,
            "Applied merge rule"
        );
    }

    pub fn log_forward_added(&self, local: u16, remote: u16) {
        debug!(
            event = "forward_added",
            workload = %self.workload,
            local = local,
            remote = remote,
            "Added port forward"
        );
    }

    pub fn log_invalid_port(&self, port: i32) {
        warn!(
            event = "invalid_port",
            workload = %self.workload,
            port = port,
            "Ignoring service port outside the valid range"
        );
    }

    pub fn log_inference_completed(&self, forwards: usize) {
        info!(
            event = "inference_completed",
            workload = %self.workload,
            forwards = forwards,
            "Dev descriptor inferred"
        );
    }
}
