//! Core data models for dev environment inference

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies the workload (Deployment) and the container to introspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub name: String,
    pub namespace: String,
    pub container: String,
}

impl WorkloadRef {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            container: container.into(),
        }
    }
}

/// Deployment metadata used for resolution and naming heuristics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadMetadata {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    /// Value of the `deployment.kubernetes.io/revision` annotation
    pub revision: Option<String>,
    /// Label selector in `k=v,k2=v2` form, if the Deployment declares one
    pub selector: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Container names from the pod template, in declaration order
    pub containers: Vec<String>,
}

/// The ReplicaSet tracking the workload's current generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetRef {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub selector: Option<String>,
}

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase string reported in a pod status
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// Runtime state of a single container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Waiting(Option<String>),
    Terminated(Option<String>),
    Unknown,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

/// A container as seen in a live pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceContainer {
    pub name: String,
    pub state: ContainerState,
    /// Resource limits declared in the pod spec (resource name -> quantity)
    pub limits: BTreeMap<String, String>,
}

/// A live pod backing a workload
///
/// Resolved fresh on every inference call and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningInstance {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<InstanceContainer>,
}

impl RunningInstance {
    /// Look up a container by name
    pub fn container(&self, name: &str) -> Option<&InstanceContainer> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// A pod is usable only if it is running and so is the target container
    pub fn is_usable(&self, container: &str) -> bool {
        self.phase == PodPhase::Running
            && self
                .container(container)
                .map(|c| c.state.is_running())
                .unwrap_or(false)
    }
}

/// Security settings for the dev container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
}

/// Resource quantities, kept in their Kubernetes string form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: ResourceList,
}

/// A local -> remote port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub local: u16,
    pub remote: u16,
}

impl PortForward {
    pub fn new(local: u16, remote: u16) -> Self {
        Self { local, remote }
    }
}

/// Development environment descriptor populated by inference
///
/// Every field starts unset. Inference only writes fields that are still
/// unset, so values supplied by the caller always win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workdir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forward: Vec<PortForward>,
}

impl DevDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run-as user, if one has been set
    pub fn run_as_user(&self) -> Option<i64> {
        self.security_context.as_ref().and_then(|s| s.run_as_user)
    }
}
