//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use devinit_lib::{DevDescriptor, PortForward};
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Row for the descriptor summary table
#[derive(Debug, Tabled, Serialize)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: &'static str,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Row for the forwards table
#[derive(Debug, Tabled, Serialize)]
pub struct ForwardRow {
    #[tabled(rename = "Local")]
    pub local: u16,
    #[tabled(rename = "Remote")]
    pub remote: u16,
}

impl From<&PortForward> for ForwardRow {
    fn from(forward: &PortForward) -> Self {
        Self {
            local: forward.local,
            remote: forward.remote,
        }
    }
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print an inferred descriptor
pub fn print_descriptor(dev: &DevDescriptor, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(dev)?);
        }
        OutputFormat::Table => {
            println!("{}", "Dev Environment".bold());
            println!("{}", "=".repeat(60));
            let table = Table::new(descriptor_rows(dev))
                .with(Style::rounded())
                .to_string();
            println!("{}", table);

            println!();
            println!("{}", "Forwards".bold());
            if dev.forward.is_empty() {
                print_warning("No ports to forward");
            } else {
                let rows: Vec<ForwardRow> = dev.forward.iter().map(ForwardRow::from).collect();
                print_table(&rows, format);
            }
        }
    }
    Ok(())
}

/// Summary rows for a descriptor; unset fields render as `-`
pub fn descriptor_rows(dev: &DevDescriptor) -> Vec<FieldRow> {
    let limits = dev.resources.as_ref().map(|r| &r.limits);
    vec![
        FieldRow {
            field: "Name",
            value: or_dash(&dev.name),
        },
        FieldRow {
            field: "Labels",
            value: or_dash(&format_map(&dev.labels)),
        },
        FieldRow {
            field: "Annotations",
            value: or_dash(&format_map(&dev.annotations)),
        },
        FieldRow {
            field: "Workdir",
            value: or_dash(&dev.workdir),
        },
        FieldRow {
            field: "Command",
            value: or_dash(&dev.command.as_deref().unwrap_or_default().join(" ")),
        },
        FieldRow {
            field: "Run as user",
            value: dev
                .run_as_user()
                .map(|uid| uid.to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            field: "CPU limit",
            value: or_dash(limits.and_then(|l| l.cpu.as_deref()).unwrap_or_default()),
        },
        FieldRow {
            field: "Memory limit",
            value: or_dash(limits.and_then(|l| l.memory.as_deref()).unwrap_or_default()),
        },
    ]
}

fn format_map(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
