//! `devinit init`: infer a dev descriptor from a running deployment

use anyhow::{Context, Result};
use devinit_lib::{DevDescriptor, DevInference, KubeOrchestrator, Orchestrator, WorkloadRef};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::Settings;
use crate::output::{print_descriptor, print_info, print_success, OutputFormat};

/// Arguments of the init command
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub deployment: String,
    pub namespace: Option<String>,
    pub container: Option<String>,
    pub from: Option<PathBuf>,
}

/// Run inference against the cluster and print the resulting descriptor
pub async fn run_init(settings: &Settings, args: InitArgs) -> Result<()> {
    let orchestrator =
        KubeOrchestrator::from_kubeconfig(settings.kubeconfig.as_deref(), settings.context.clone())
            .await
            .context("Failed to connect to the Kubernetes cluster")?;

    let namespace = args
        .namespace
        .or_else(|| settings.namespace.clone())
        .unwrap_or_else(|| orchestrator.default_namespace().to_string());

    let container = match args.container {
        Some(container) => container,
        None => default_container(&orchestrator, &args.deployment, &namespace).await?,
    };
    debug!(deployment = %args.deployment, %namespace, %container, "Inferring dev descriptor");

    let mut dev = match &args.from {
        Some(path) => load_descriptor(path)?,
        None => DevDescriptor::new(),
    };

    let workload_ref = WorkloadRef::new(&args.deployment, &namespace, &container);
    DevInference::new(Arc::new(orchestrator))
        .infer(&workload_ref, &mut dev)
        .await?;
    info!(deployment = %args.deployment, "Inference finished");

    if settings.format == OutputFormat::Table {
        print_success(&format!(
            "Inferred dev environment from deployment '{}' (container '{}')",
            args.deployment, container
        ));
        if args.from.is_some() {
            print_info("Values already present in the input descriptor were kept");
        }
        println!();
    }
    print_descriptor(&dev, settings.format)
}

/// The first container of the deployment's pod template
async fn default_container(
    orchestrator: &dyn Orchestrator,
    deployment: &str,
    namespace: &str,
) -> Result<String> {
    let workload = orchestrator
        .workload(deployment, namespace)
        .await
        .with_context(|| format!("Failed to get deployment '{}'", deployment))?;
    workload
        .containers
        .into_iter()
        .next()
        .with_context(|| format!("Deployment '{}' declares no containers", deployment))
}

/// Read an existing descriptor to merge into
pub fn load_descriptor(path: &Path) -> Result<DevDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse descriptor {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.json");
        std::fs::write(
            &path,
            r#"{"name": "api", "workdir": "/code", "forward": [{"local": 8080, "remote": 80}]}"#,
        )
        .unwrap();

        let dev = load_descriptor(&path).unwrap();
        assert_eq!(dev.name, "api");
        assert_eq!(dev.workdir, "/code");
        assert_eq!(dev.forward.len(), 1);
    }

    #[test]
    fn test_load_descriptor_errors() {
        let dir = TempDir::new().unwrap();
        assert!(load_descriptor(&dir.path().join("missing.json")).is_err());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"forward": "nope"}"#).unwrap();
        let err = load_descriptor(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse descriptor"));
    }
}
