//! Runtime introspection of a live container
//!
//! User, working directory and shell are best-effort: a failed probe is
//! logged and recorded as [`ProbeOutcome::Failed`], and the synthesizer
//! substitutes its fallback. Declared ports are required; failing to read
//! them fails the whole inference.

use crate::error::{InferError, Result};
use crate::models::{DevDescriptor, RunningInstance};
use crate::observability::PipelineLogger;
use crate::orchestrator::Orchestrator;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Shells to look for, most preferred first
pub const SHELL_PREFERENCE: [&str; 2] = ["bash", "sh"];

const USER_COMMAND: [&str; 2] = ["id", "-u"];
const WORKDIR_COMMAND: [&str; 1] = ["pwd"];

/// Result of a single best-effort probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    Observed(T),
    Failed(String),
    /// The probe was not run because its result could not be applied
    Skipped,
}

impl<T> ProbeOutcome<T> {
    pub fn from_result<E: Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => ProbeOutcome::Observed(value),
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }

    pub fn observed(self) -> Option<T> {
        match self {
            ProbeOutcome::Observed(value) => Some(value),
            _ => None,
        }
    }

    /// Observed value, or the fallback if the probe ran and failed
    ///
    /// Skipped probes yield `None`: there is nothing to apply.
    pub fn or_fallback(self, fallback: impl FnOnce() -> T) -> Option<T> {
        match self {
            ProbeOutcome::Observed(value) => Some(value),
            ProbeOutcome::Failed(_) => Some(fallback()),
            ProbeOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ProbeOutcome::Skipped)
    }
}

/// Which best-effort probes are worth running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePlan {
    /// User and working directory, applied together
    pub runtime: bool,
    pub command: bool,
}

impl ProbePlan {
    pub fn all() -> Self {
        Self {
            runtime: true,
            command: true,
        }
    }

    /// Skip probes whose descriptor fields are already decided
    pub fn for_descriptor(dev: &DevDescriptor) -> Self {
        Self {
            runtime: dev.workdir.is_empty(),
            command: dev.command.is_none(),
        }
    }
}

/// Facts gathered from the live pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedFacts {
    pub user: ProbeOutcome<i64>,
    pub workdir: ProbeOutcome<String>,
    pub shell: ProbeOutcome<String>,
    /// Ports declared by the Services selecting the pod, in order
    pub ports: Vec<u16>,
    /// Whether the target container declares any resource limit
    pub has_limits: bool,
}

impl Default for ProbedFacts {
    fn default() -> Self {
        Self {
            user: ProbeOutcome::Skipped,
            workdir: ProbeOutcome::Skipped,
            shell: ProbeOutcome::Skipped,
            ports: Vec::new(),
            has_limits: false,
        }
    }
}

/// Runs probes against one container of a resolved pod
pub struct RuntimeIntrospector {
    orchestrator: Arc<dyn Orchestrator>,
    logger: PipelineLogger,
}

impl RuntimeIntrospector {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, logger: PipelineLogger) -> Self {
        Self {
            orchestrator,
            logger,
        }
    }

    /// Run every planned probe
    ///
    /// The probes run concurrently and never cancel one another; only the
    /// ports probe can fail the call.
    pub async fn probe(
        &self,
        instance: &RunningInstance,
        container: &str,
        plan: ProbePlan,
    ) -> Result<ProbedFacts> {
        let (user, workdir, shell, ports) = tokio::join!(
            self.probe_user(instance, container, plan.runtime),
            self.probe_workdir(instance, container, plan.runtime),
            self.probe_shell(instance, container, plan.command),
            self.probe_ports(instance),
        );

        let has_limits = instance
            .container(container)
            .map(|c| !c.limits.is_empty())
            .unwrap_or(false);

        Ok(ProbedFacts {
            user,
            workdir,
            shell,
            ports: ports?,
            has_limits,
        })
    }

    async fn probe_user(
        &self,
        instance: &RunningInstance,
        container: &str,
        enabled: bool,
    ) -> ProbeOutcome<i64> {
        if !enabled {
            return ProbeOutcome::Skipped;
        }
        let result = self
            .run(instance, container, &USER_COMMAND)
            .await
            .and_then(|stdout| {
                stdout
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| format!("unexpected output {:?}: {}", stdout.trim(), e))
            });
        self.record("user", instance, ProbeOutcome::from_result(result))
    }

    async fn probe_workdir(
        &self,
        instance: &RunningInstance,
        container: &str,
        enabled: bool,
    ) -> ProbeOutcome<String> {
        if !enabled {
            return ProbeOutcome::Skipped;
        }
        let result = self
            .run(instance, container, &WORKDIR_COMMAND)
            .await
            .and_then(|stdout| {
                let path = stdout.trim();
                if path.starts_with('/') {
                    Ok(path.to_string())
                } else {
                    Err(format!("not an absolute path: {:?}", path))
                }
            });
        self.record("workdir", instance, ProbeOutcome::from_result(result))
    }

    async fn probe_shell(
        &self,
        instance: &RunningInstance,
        container: &str,
        enabled: bool,
    ) -> ProbeOutcome<String> {
        if !enabled {
            return ProbeOutcome::Skipped;
        }
        for shell in SHELL_PREFERENCE {
            // A failing `which` just means the shell is not there
            match self.run(instance, container, &["which", shell]).await {
                Ok(_) => {
                    return self.record(
                        "shell",
                        instance,
                        ProbeOutcome::Observed(shell.to_string()),
                    )
                }
                Err(e) => debug!(shell = %shell, error = %e, "Shell not available"),
            }
        }
        self.record(
            "shell",
            instance,
            ProbeOutcome::Failed(format!("none of {:?} available", SHELL_PREFERENCE)),
        )
    }

    async fn probe_ports(&self, instance: &RunningInstance) -> Result<Vec<u16>> {
        let ports = self
            .orchestrator
            .service_ports(instance)
            .await
            .map_err(|source| InferError::Ports {
                pod: instance.name.clone(),
                source,
            })?;
        Ok(ports
            .into_iter()
            .filter_map(|port| match u16::try_from(port) {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    self.logger.log_invalid_port(port);
                    None
                }
            })
            .collect())
    }

    /// Exec a command; a non-zero exit counts as a failure
    async fn run(
        &self,
        instance: &RunningInstance,
        container: &str,
        command: &[&str],
    ) -> std::result::Result<String, String> {
        let output = self
            .orchestrator
            .exec(instance, container, command)
            .await
            .map_err(|e| e.to_string())?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(format!(
                "'{}' failed: {}",
                command.join(" "),
                output.stderr.trim()
            ))
        }
    }

    fn record<T: Display>(
        &self,
        probe: &str,
        instance: &RunningInstance,
        outcome: ProbeOutcome<T>,
    ) -> ProbeOutcome<T> {
        match &outcome {
            ProbeOutcome::Observed(value) => {
                self.logger.log_probe_observed(probe, &value.to_string())
            }
            ProbeOutcome::Failed(error) => {
                self.logger.log_probe_failed(probe, &instance.name, error)
            }
            ProbeOutcome::Skipped => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{ExecOutput, FakeOrchestrator};

    async fn probe(fake: FakeOrchestrator, plan: ProbePlan) -> Result<ProbedFacts> {
        let instance = fake.pod();
        let introspector = RuntimeIntrospector::new(Arc::new(fake), PipelineLogger::new("web"));
        introspector.probe(&instance, "web", plan).await
    }

    #[tokio::test]
    async fn test_all_probes_observed() {
        let fake = FakeOrchestrator::running("web")
            .with_exec("id -u", ExecOutput::ok("1000\n"))
            .with_exec("pwd", ExecOutput::ok("/usr/src/app\n"))
            .with_exec("which bash", ExecOutput::ok("/bin/bash\n"))
            .with_ports(&[80, 443])
            .with_limit("cpu", "500m");

        let facts = probe(fake, ProbePlan::all()).await.unwrap();
        assert_eq!(facts.user, ProbeOutcome::Observed(1000));
        assert_eq!(facts.workdir, ProbeOutcome::Observed("/usr/src/app".to_string()));
        assert_eq!(facts.shell, ProbeOutcome::Observed("bash".to_string()));
        assert_eq!(facts.ports, vec![80, 443]);
        assert!(facts.has_limits);
    }

    #[tokio::test]
    async fn test_soft_failures_do_not_abort() {
        let fake = FakeOrchestrator::running("web")
            .with_exec_error("id -u", "container not found")
            .with_exec("pwd", ExecOutput::failed("permission denied"))
            .with_ports(&[8080]);

        let facts = probe(fake, ProbePlan::all()).await.unwrap();
        assert!(matches!(facts.user, ProbeOutcome::Failed(_)));
        assert!(matches!(facts.workdir, ProbeOutcome::Failed(_)));
        assert!(matches!(facts.shell, ProbeOutcome::Failed(_)));
        assert_eq!(facts.ports, vec![8080]);
        assert!(!facts.has_limits);
    }

    #[tokio::test]
    async fn test_unparseable_user_and_relative_workdir_fail() {
        let fake = FakeOrchestrator::running("web")
            .with_exec("id -u", ExecOutput::ok("nobody\n"))
            .with_exec("pwd", ExecOutput::ok("app\n"));

        let facts = probe(fake, ProbePlan::all()).await.unwrap();
        assert!(matches!(facts.user, ProbeOutcome::Failed(_)));
        assert!(matches!(facts.workdir, ProbeOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_shell_falls_through_preference_order() {
        let fake = FakeOrchestrator::running("web")
            .with_exec_error("which bash", "exec: \"which\": executable file not found")
            .with_exec("which sh", ExecOutput::ok("/bin/sh\n"));

        let facts = probe(fake, ProbePlan::all()).await.unwrap();
        assert_eq!(facts.shell, ProbeOutcome::Observed("sh".to_string()));
    }

    #[tokio::test]
    async fn test_ports_failure_is_hard_error() {
        let fake = FakeOrchestrator::running("web")
            .with_exec("pwd", ExecOutput::ok("/app\n"))
            .with_ports_error("services is forbidden");

        let err = probe(fake, ProbePlan::all()).await.unwrap_err();
        assert!(matches!(err, InferError::Ports { .. }));
    }

    #[tokio::test]
    async fn test_invalid_ports_are_dropped() {
        let fake = FakeOrchestrator::running("web").with_ports(&[0, 80, 70000, -1, 3000]);
        let facts = probe(fake, ProbePlan::all()).await.unwrap();
        assert_eq!(facts.ports, vec![80, 3000]);
    }

    #[tokio::test]
    async fn test_skipped_probes_do_not_exec() {
        let fake = Arc::new(FakeOrchestrator::running("web").with_ports(&[80]));
        let instance = fake.pod();
        let introspector = RuntimeIntrospector::new(fake.clone(), PipelineLogger::new("web"));
        let plan = ProbePlan {
            runtime: false,
            command: false,
        };

        let facts = introspector.probe(&instance, "web", plan).await.unwrap();
        assert!(facts.user.is_skipped());
        assert!(facts.workdir.is_skipped());
        assert!(facts.shell.is_skipped());
        assert!(fake.exec_log().is_empty());
    }

    #[test]
    fn test_probe_plan_for_descriptor() {
        let mut dev = DevDescriptor::new();
        assert_eq!(ProbePlan::for_descriptor(&dev), ProbePlan::all());

        dev.workdir = "/app".to_string();
        dev.command = Some(vec!["bash".to_string()]);
        let plan = ProbePlan::for_descriptor(&dev);
        assert!(!plan.runtime);
        assert!(!plan.command);
    }

    #[test]
    fn test_probe_outcome_fallback() {
        let observed: ProbeOutcome<String> = ProbeOutcome::Observed("/app".to_string());
        assert_eq!(observed.or_fallback(|| "/okteto".to_string()), Some("/app".to_string()));

        let failed: ProbeOutcome<String> = ProbeOutcome::Failed("boom".to_string());
        assert_eq!(failed.or_fallback(|| "/okteto".to_string()), Some("/okteto".to_string()));

        let skipped: ProbeOutcome<String> = ProbeOutcome::Skipped;
        assert_eq!(skipped.or_fallback(|| "/okteto".to_string()), None);
    }
}
