//! Dev environment inference library
//!
//! This crate infers a development descriptor from a workload already
//! running in Kubernetes:
//! - Resolving the running pod behind a Deployment
//! - Probing the live container (user, working directory, shell, ports)
//! - Merging the results into a caller-owned descriptor without overwriting
//!   what the caller already decided

pub mod error;
pub mod introspect;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod resolver;
pub mod synth;

pub use error::{InferError, OrchestratorError};
pub use models::*;
pub use observability::PipelineLogger;
pub use orchestrator::{ExecOutput, KubeOrchestrator, Orchestrator};
pub use pipeline::{infer_dev, DevInference};
