//! Kubernetes-backed orchestrator
//!
//! Reads Deployments, ReplicaSets, Pods and Services through `kube-rs` and
//! runs probe commands with the pod `exec` subresource.

use super::{async_trait, ExecOutput, Orchestrator};
use crate::error::OrchestratorError;
use crate::models::{
    ContainerState, InstanceContainer, PodPhase, ReplicaSetRef, RunningInstance,
    WorkloadMetadata,
};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, AttachParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Annotation carrying the rollout revision on Deployments and ReplicaSets
const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Orchestrator backed by a live Kubernetes API server
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self, OrchestratorError> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Connect using an explicit kubeconfig file and/or context
    pub async fn from_kubeconfig(
        path: Option<&Path>,
        context: Option<String>,
    ) -> Result<Self, OrchestratorError> {
        let options = KubeConfigOptions {
            context,
            cluster: None,
            user: None,
        };
        let config = match path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None => Config::from_kubeconfig(&options).await?,
        };
        debug!(cluster_url = %config.cluster_url, "Connecting to cluster");
        Ok(Self::new(Client::try_from(config)?))
    }

    /// Namespace of the active kubeconfig context
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn workload(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<WorkloadMetadata, OrchestratorError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment =
            deployments
                .get_opt(name)
                .await?
                .ok_or_else(|| OrchestratorError::NotFound {
                    kind: "deployment",
                    name: name.to_string(),
                })?;
        Ok(workload_from_deployment(deployment))
    }

    async fn current_replica_set(
        &self,
        workload: &WorkloadMetadata,
    ) -> Result<Option<ReplicaSetRef>, OrchestratorError> {
        let replica_sets: Api<ReplicaSet> =
            Api::namespaced(self.client.clone(), &workload.namespace);
        let list = replica_sets.list(&list_params(workload.selector.as_deref())).await?;
        debug!(
            workload = %workload.name,
            candidates = list.items.len(),
            "Listed replicasets"
        );
        Ok(select_current_replica_set(workload, list.items))
    }

    async fn replica_set_pods(
        &self,
        replica_set: &ReplicaSetRef,
    ) -> Result<Vec<RunningInstance>, OrchestratorError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &replica_set.namespace);
        let list = pods.list(&list_params(replica_set.selector.as_deref())).await?;
        Ok(list
            .items
            .into_iter()
            .filter(|pod| is_owned_by(&pod.metadata, &replica_set.uid))
            .map(instance_from_pod)
            .collect())
    }

    async fn exec(
        &self,
        instance: &RunningInstance,
        container: &str,
        command: &[&str],
    ) -> Result<ExecOutput, OrchestratorError> {
        let exec_error = |message: String| OrchestratorError::Exec {
            pod: instance.name.clone(),
            container: container.to_string(),
            message,
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &instance.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = pods.exec(&instance.name, command.to_vec(), &params).await?;

        let status = attached.take_status();
        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let stdout = stdout.map_err(|e| exec_error(e.to_string()))?;
        let stderr = stderr.map_err(|e| exec_error(e.to_string()))?;

        let success = match status {
            Some(status) => status
                .await
                .map(|s| s.status.as_deref() == Some("Success"))
                .unwrap_or(false),
            None => false,
        };
        attached
            .join()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            success,
        })
    }

    async fn service_ports(
        &self,
        instance: &RunningInstance,
    ) -> Result<Vec<i32>, OrchestratorError> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &instance.namespace);
        let list = services.list(&ListParams::default()).await?;
        Ok(ports_selecting(&instance.labels, &list.items))
    }
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut buf = String::new();
    if let Some(mut reader) = reader {
        reader.read_to_string(&mut buf).await?;
    }
    Ok(buf)
}

fn list_params(selector: Option<&str>) -> ListParams {
    match selector {
        Some(selector) => ListParams::default().labels(selector),
        None => ListParams::default(),
    }
}

/// Render a `matchLabels` selector as `k=v,k2=v2`
fn selector_string(selector: &LabelSelector) -> Option<String> {
    let labels = selector.match_labels.as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn is_owned_by(meta: &ObjectMeta, owner_uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|r| r.uid == owner_uid))
        .unwrap_or(false)
}

fn revision(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .map(String::as_str)
}

fn workload_from_deployment(deployment: Deployment) -> WorkloadMetadata {
    let meta = deployment.metadata;
    let spec = deployment.spec;
    WorkloadMetadata {
        revision: revision(&meta).map(str::to_string),
        selector: spec.as_ref().and_then(|s| selector_string(&s.selector)),
        containers: spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|p| p.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default(),
        name: meta.name.unwrap_or_default(),
        namespace: meta.namespace.unwrap_or_default(),
        uid: meta.uid.unwrap_or_default(),
        labels: meta.labels.unwrap_or_default(),
        annotations: meta.annotations.unwrap_or_default(),
    }
}

/// Pick the ReplicaSet owned by the workload whose revision matches the
/// workload's current revision
fn select_current_replica_set(
    workload: &WorkloadMetadata,
    replica_sets: Vec<ReplicaSet>,
) -> Option<ReplicaSetRef> {
    replica_sets
        .into_iter()
        .find(|rs| {
            is_owned_by(&rs.metadata, &workload.uid)
                && revision(&rs.metadata).is_some()
                && revision(&rs.metadata) == workload.revision.as_deref()
        })
        .map(|rs| ReplicaSetRef {
            selector: rs.spec.as_ref().and_then(|s| selector_string(&s.selector)),
            name: rs.metadata.name.unwrap_or_default(),
            namespace: rs
                .metadata
                .namespace
                .unwrap_or_else(|| workload.namespace.clone()),
            uid: rs.metadata.uid.unwrap_or_default(),
        })
}

fn instance_from_pod(pod: Pod) -> RunningInstance {
    let status = pod.status.unwrap_or_default();
    let statuses = status.container_statuses.unwrap_or_default();

    let containers = pod
        .spec
        .map(|spec| spec.containers)
        .unwrap_or_default()
        .into_iter()
        .map(|container| {
            let state = statuses
                .iter()
                .find(|s| s.name == container.name)
                .and_then(|s| s.state.as_ref())
                .map(|state| {
                    if state.running.is_some() {
                        ContainerState::Running
                    } else if let Some(waiting) = &state.waiting {
                        ContainerState::Waiting(waiting.reason.clone())
                    } else if let Some(terminated) = &state.terminated {
                        ContainerState::Terminated(terminated.reason.clone())
                    } else {
                        ContainerState::Unknown
                    }
                })
                .unwrap_or(ContainerState::Unknown);
            let limits = container
                .resources
                .and_then(|r| r.limits)
                .map(|limits| limits.into_iter().map(|(k, q)| (k, q.0)).collect())
                .unwrap_or_default();
            InstanceContainer {
                name: container.name,
                state,
                limits,
            }
        })
        .collect();

    RunningInstance {
        name: pod.metadata.name.unwrap_or_default(),
        namespace: pod.metadata.namespace.unwrap_or_default(),
        phase: PodPhase::parse(status.phase.as_deref()),
        labels: pod.metadata.labels.unwrap_or_default(),
        containers,
    }
}

/// Ports of every Service whose selector matches the pod labels
fn ports_selecting(pod_labels: &BTreeMap<String, String>, services: &[Service]) -> Vec<i32> {
    let mut ports = Vec::new();
    for service in services {
        let Some(spec) = &service.spec else { continue };
        let selector = match &spec.selector {
            Some(selector) if !selector.is_empty() => selector,
            _ => continue,
        };
        if !selector.iter().all(|(k, v)| pod_labels.get(k) == Some(v)) {
            continue;
        }
        if let Some(service_ports) = &spec.ports {
            ports.extend(service_ports.iter().map(|p| p.port));
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, ReplicaSetSpec};
    use k8s_openapi::api::core::v1::{
        Container, ContainerState as K8sContainerState, ContainerStateRunning,
        ContainerStateWaiting, ContainerStatus, PodSpec, PodStatus, PodTemplateSpec,
        ResourceRequirements, ServicePort, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            ..Default::default()
        }
    }

    fn replica_set(name: &str, owner_uid: &str, revision: &str) -> ReplicaSet {
        ReplicaSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some(format!("{}-uid", name)),
                owner_references: Some(vec![owner(owner_uid)]),
                annotations: Some(labels(&[(REVISION_ANNOTATION, revision)])),
                ..Default::default()
            },
            spec: Some(ReplicaSetSpec {
                selector: LabelSelector {
                    match_labels: Some(labels(&[("app", "web")])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn workload() -> WorkloadMetadata {
        WorkloadMetadata {
            name: "web".to_string(),
            namespace: "default".to_string(),
            uid: "deploy-uid".to_string(),
            revision: Some("3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_workload_from_deployment() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("staging".to_string()),
                uid: Some("deploy-uid".to_string()),
                labels: Some(labels(&[("app", "web")])),
                annotations: Some(labels(&[(REVISION_ANNOTATION, "7")])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(labels(&[("app", "web"), ("tier", "front")])),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![
                            Container {
                                name: "web".to_string(),
                                ..Default::default()
                            },
                            Container {
                                name: "proxy".to_string(),
                                ..Default::default()
                            },
                        ],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let workload = workload_from_deployment(deployment);
        assert_eq!(workload.name, "web");
        assert_eq!(workload.namespace, "staging");
        assert_eq!(workload.revision.as_deref(), Some("7"));
        assert_eq!(workload.selector.as_deref(), Some("app=web,tier=front"));
        assert_eq!(workload.containers, vec!["web", "proxy"]);
    }

    #[test]
    fn test_select_current_replica_set_by_owner_and_revision() {
        let replica_sets = vec![
            replica_set("web-old", "deploy-uid", "2"),
            replica_set("other", "someone-else", "3"),
            replica_set("web-new", "deploy-uid", "3"),
        ];

        let selected = select_current_replica_set(&workload(), replica_sets).unwrap();
        assert_eq!(selected.name, "web-new");
        assert_eq!(selected.uid, "web-new-uid");
        assert_eq!(selected.selector.as_deref(), Some("app=web"));
    }

    #[test]
    fn test_select_current_replica_set_none_when_unowned() {
        let replica_sets = vec![replica_set("other", "someone-else", "3")];
        assert!(select_current_replica_set(&workload(), replica_sets).is_none());
    }

    #[test]
    fn test_instance_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-abc".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(labels(&[("app", "web")])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "web".to_string(),
                        resources: Some(ResourceRequirements {
                            limits: Some(
                                [("memory".to_string(), Quantity("512Mi".to_string()))]
                                    .into_iter()
                                    .collect(),
                            ),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    Container {
                        name: "proxy".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![
                    ContainerStatus {
                        name: "web".to_string(),
                        state: Some(K8sContainerState {
                            running: Some(ContainerStateRunning::default()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ContainerStatus {
                        name: "proxy".to_string(),
                        state: Some(K8sContainerState {
                            waiting: Some(ContainerStateWaiting {
                                reason: Some("CrashLoopBackOff".to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
        };

        let instance = instance_from_pod(pod);
        assert_eq!(instance.phase, PodPhase::Running);
        assert!(instance.is_usable("web"));
        assert!(!instance.is_usable("proxy"));
        assert_eq!(
            instance.container("proxy").unwrap().state,
            ContainerState::Waiting(Some("CrashLoopBackOff".to_string()))
        );
        assert_eq!(
            instance.container("web").unwrap().limits.get("memory"),
            Some(&"512Mi".to_string())
        );
        assert!(instance.container("proxy").unwrap().limits.is_empty());
    }

    fn service(selector: Option<BTreeMap<String, String>>, ports: &[i32]) -> Service {
        Service {
            spec: Some(ServiceSpec {
                selector,
                ports: Some(
                    ports
                        .iter()
                        .map(|p| ServicePort {
                            port: *p,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_ports_selecting_matching_services_in_order() {
        let pod_labels = labels(&[("app", "web"), ("tier", "front")]);
        let services = vec![
            service(Some(labels(&[("app", "web")])), &[80, 9000]),
            service(Some(labels(&[("app", "db")])), &[5432]),
            service(None, &[7000]),
            service(Some(labels(&[("tier", "front")])), &[8080]),
        ];

        assert_eq!(ports_selecting(&pod_labels, &services), vec![80, 9000, 8080]);
    }
}
