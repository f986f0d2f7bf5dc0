//! In-memory orchestrator for tests

use super::{async_trait, ExecOutput, Orchestrator};
use crate::error::OrchestratorError;
use crate::models::{
    ContainerState, InstanceContainer, PodPhase, ReplicaSetRef, RunningInstance,
    WorkloadMetadata,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Scripted orchestrator holding a single workload
///
/// Exec results are keyed by the command joined with spaces (`"id -u"`).
/// Commands without a scripted result fail, which the introspector treats
/// like a missing binary.
pub struct FakeOrchestrator {
    workload: WorkloadMetadata,
    replica_set: Option<ReplicaSetRef>,
    pods: Vec<RunningInstance>,
    exec_results: HashMap<String, Result<ExecOutput, String>>,
    ports: Result<Vec<i32>, String>,
    exec_log: Mutex<Vec<String>>,
}

impl FakeOrchestrator {
    /// A Deployment named `name` with one running pod whose single
    /// container is also called `name`
    pub fn running(name: &str) -> Self {
        let workload = WorkloadMetadata {
            name: name.to_string(),
            namespace: "default".to_string(),
            uid: format!("{}-uid", name),
            revision: Some("1".to_string()),
            selector: Some(format!("app={}", name)),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            containers: vec![name.to_string()],
        };
        let replica_set = ReplicaSetRef {
            name: format!("{}-5d8f7c", name),
            namespace: "default".to_string(),
            uid: format!("{}-rs-uid", name),
            selector: workload.selector.clone(),
        };
        let pod = RunningInstance {
            name: format!("{}-5d8f7c-x2x9k", name),
            namespace: "default".to_string(),
            phase: PodPhase::Running,
            labels: [("app".to_string(), name.to_string())].into_iter().collect(),
            containers: vec![InstanceContainer {
                name: name.to_string(),
                state: ContainerState::Running,
                limits: BTreeMap::new(),
            }],
        };
        Self {
            workload,
            replica_set: Some(replica_set),
            pods: vec![pod],
            exec_results: HashMap::new(),
            ports: Ok(Vec::new()),
            exec_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.workload
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.workload
            .annotations
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_replica_set(mut self) -> Self {
        self.replica_set = None;
        self
    }

    /// Replace the pods owned by the ReplicaSet
    pub fn with_pods(mut self, pods: Vec<RunningInstance>) -> Self {
        self.pods = pods;
        self
    }

    /// The default pod, for tests that want to tweak it
    pub fn pod(&self) -> RunningInstance {
        self.pods[0].clone()
    }

    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        for pod in &mut self.pods {
            pod.phase = phase;
        }
        self
    }

    pub fn with_container_state(mut self, state: ContainerState) -> Self {
        for pod in &mut self.pods {
            for container in &mut pod.containers {
                container.state = state.clone();
            }
        }
        self
    }

    pub fn with_limit(mut self, resource: &str, quantity: &str) -> Self {
        for pod in &mut self.pods {
            for container in &mut pod.containers {
                container
                    .limits
                    .insert(resource.to_string(), quantity.to_string());
            }
        }
        self
    }

    pub fn with_exec(mut self, command: &str, output: ExecOutput) -> Self {
        self.exec_results.insert(command.to_string(), Ok(output));
        self
    }

    pub fn with_exec_error(mut self, command: &str, message: &str) -> Self {
        self.exec_results
            .insert(command.to_string(), Err(message.to_string()));
        self
    }

    pub fn with_ports(mut self, ports: &[i32]) -> Self {
        self.ports = Ok(ports.to_vec());
        self
    }

    pub fn with_ports_error(mut self, message: &str) -> Self {
        self.ports = Err(message.to_string());
        self
    }

    /// Commands executed so far, in call order
    pub fn exec_log(&self) -> Vec<String> {
        self.exec_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn workload(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<WorkloadMetadata, OrchestratorError> {
        if name == self.workload.name && namespace == self.workload.namespace {
            Ok(self.workload.clone())
        } else {
            Err(OrchestratorError::NotFound {
                kind: "deployment",
                name: name.to_string(),
            })
        }
    }

    async fn current_replica_set(
        &self,
        _workload: &WorkloadMetadata,
    ) -> Result<Option<ReplicaSetRef>, OrchestratorError> {
        Ok(self.replica_set.clone())
    }

    async fn replica_set_pods(
        &self,
        _replica_set: &ReplicaSetRef,
    ) -> Result<Vec<RunningInstance>, OrchestratorError> {
        Ok(self.pods.clone())
    }

    async fn exec(
        &self,
        instance: &RunningInstance,
        container: &str,
        command: &[&str],
    ) -> Result<ExecOutput, OrchestratorError> {
        let key = command.join(" ");
        if let Ok(mut log) = self.exec_log.lock() {
            log.push(key.clone());
        }
        match self.exec_results.get(&key) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(OrchestratorError::Exec {
                pod: instance.name.clone(),
                container: container.to_string(),
                message: message.clone(),
            }),
            None => Err(OrchestratorError::Exec {
                pod: instance.name.clone(),
                container: container.to_string(),
                message: format!("{}: command not found", key),
            }),
        }
    }

    async fn service_ports(
        &self,
        _instance: &RunningInstance,
    ) -> Result<Vec<i32>, OrchestratorError> {
        self.ports.clone().map_err(OrchestratorError::Other)
    }
}
