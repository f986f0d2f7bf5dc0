//! Subcommand implementations

pub mod forwards;
pub mod init;

use crate::output::OutputFormat;
use std::path::PathBuf;

/// Settings shared by every subcommand, merged from flags and config
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub format: OutputFormat,
}
