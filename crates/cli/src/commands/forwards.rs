//! `devinit forwards`: preview local port assignment without a cluster

use anyhow::Result;
use devinit_lib::synth::assign_forwards;
use devinit_lib::PortForward;

use crate::output::{print_table, ForwardRow, OutputFormat};

/// Parse a `LOCAL:REMOTE` pair
pub fn parse_forward(value: &str) -> Result<PortForward, String> {
    let (local, remote) = value
        .split_once(':')
        .ok_or_else(|| format!("expected LOCAL:REMOTE, got '{}'", value))?;
    let local = local
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid local port '{}': {}", local, e))?;
    let remote = remote
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid remote port '{}': {}", remote, e))?;
    Ok(PortForward::new(local, remote))
}

/// Print the forwards that would be added for `ports` on top of `existing`
pub fn run_forwards(ports: &[u16], existing: &[PortForward], format: OutputFormat) -> Result<()> {
    let added = assign_forwards(existing, ports)?;
    let rows: Vec<ForwardRow> = added.iter().map(ForwardRow::from).collect();
    print_table(&rows, format);
    Ok(())
}
