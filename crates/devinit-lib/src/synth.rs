//! Dev descriptor synthesis
//!
//! Merges probed facts and workload metadata into a [`DevDescriptor`]
//! through a fixed list of named merge rules. Each rule owns its guard: a
//! field the caller already set is never overwritten.

use crate::error::{InferError, Result};
use crate::introspect::ProbedFacts;
use crate::models::{
    DevDescriptor, PortForward, ResourceList, ResourceRequirements, RunningInstance,
    SecurityContext, WorkloadMetadata,
};
use crate::observability::PipelineLogger;
use std::collections::{BTreeMap, HashSet};

/// Label keys naming the component, most specific first
pub const COMPONENT_LABELS: [&str; 3] = ["app.kubernetes.io/component", "component", "app"];

/// Set by Flux on workloads it manages
pub const FLUX_ANNOTATION: &str = "flux.weave.works/antecedent";
pub const FLUX_IGNORE_ANNOTATION: &str = "fluxcd.io/ignore";

pub const FALLBACK_WORKDIR: &str = "/okteto";
pub const FALLBACK_SHELL: &str = "sh";

/// Remote ports at or below this are privileged
pub const PRIVILEGED_PORT_MAX: u16 = 1024;
/// Offset added to privileged ports to pick a local port
pub const PRIVILEGED_PORT_SHIFT: u16 = 8000;

/// Limits pinned on the descriptor when the live container has any limit
pub const BASELINE_CPU_LIMIT: &str = "1";
pub const BASELINE_MEMORY_LIMIT: &str = "2Gi";

/// Everything a merge rule may read
pub struct SynthesisInput<'a> {
    pub workload: &'a WorkloadMetadata,
    pub instance: &'a RunningInstance,
    pub facts: &'a ProbedFacts,
    pub logger: &'a PipelineLogger,
}

pub type MergeRule = fn(&mut DevDescriptor, &SynthesisInput<'_>) -> Result<bool>;

/// Rules in application order; each returns whether it changed the descriptor
pub const MERGE_RULES: &[(&str, MergeRule)] = &[
    ("runtime", merge_runtime),
    ("command", merge_command),
    ("name_and_labels", merge_name_and_labels),
    ("annotations", merge_annotations),
    ("resources", merge_resources),
    ("forwards", merge_forwards),
];

/// Apply every merge rule to `dev`
pub fn synthesize(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<()> {
    for (name, rule) in MERGE_RULES {
        if rule(dev, input)? {
            input.logger.log_rule_applied(name);
        }
    }
    Ok(())
}

/// User and working directory, both gated on the working directory being
/// unset
pub fn merge_runtime(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<bool> {
    if !dev.workdir.is_empty() {
        return Ok(false);
    }
    if let Some(uid) = input.facts.user.clone().observed() {
        // Root is the default; nothing to pin
        if uid != 0 {
            dev.security_context = Some(SecurityContext {
                run_as_user: Some(uid),
            });
        }
    }
    match input
        .facts
        .workdir
        .clone()
        .or_fallback(|| FALLBACK_WORKDIR.to_string())
    {
        Some(workdir) => {
            dev.workdir = workdir;
            Ok(true)
        }
        None => Ok(dev.security_context.is_some()),
    }
}

pub fn merge_command(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<bool> {
    if dev.command.is_some() {
        return Ok(false);
    }
    match input
        .facts
        .shell
        .clone()
        .or_fallback(|| FALLBACK_SHELL.to_string())
    {
        Some(shell) => {
            dev.command = Some(vec![shell]);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// The first component label found names the descriptor and becomes its
/// only label selector; otherwise the workload name is used
pub fn merge_name_and_labels(
    dev: &mut DevDescriptor,
    input: &SynthesisInput<'_>,
) -> Result<bool> {
    let (name, labels) = component_name(&input.workload.labels)
        .map(|(key, value)| {
            (
                value.to_string(),
                BTreeMap::from([(key.to_string(), value.to_string())]),
            )
        })
        .unwrap_or_else(|| (input.workload.name.clone(), BTreeMap::new()));

    let mut changed = false;
    if dev.name.is_empty() && !name.is_empty() {
        dev.name = name;
        changed = true;
    }
    if dev.labels.is_empty() && !labels.is_empty() {
        dev.labels = labels;
        changed = true;
    }
    Ok(changed)
}

/// First preferred label key with a non-empty value
pub fn component_name(labels: &BTreeMap<String, String>) -> Option<(&'static str, &str)> {
    COMPONENT_LABELS.iter().find_map(|key| {
        labels
            .get(*key)
            .filter(|value| !value.is_empty())
            .map(|value| (*key, value.as_str()))
    })
}

pub fn merge_annotations(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<bool> {
    if !dev.annotations.is_empty() {
        return Ok(false);
    }
    let flux_managed = input
        .workload
        .annotations
        .get(FLUX_ANNOTATION)
        .map(|v| !v.is_empty())
        .unwrap_or(false);
    if !flux_managed {
        return Ok(false);
    }
    dev.annotations
        .insert(FLUX_IGNORE_ANNOTATION.to_string(), "true".to_string());
    Ok(true)
}

pub fn merge_resources(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<bool> {
    if dev.resources.is_some() || !input.facts.has_limits {
        return Ok(false);
    }
    dev.resources = Some(baseline_resources());
    Ok(true)
}

pub fn baseline_resources() -> ResourceRequirements {
    ResourceRequirements {
        limits: ResourceList {
            cpu: Some(BASELINE_CPU_LIMIT.to_string()),
            memory: Some(BASELINE_MEMORY_LIMIT.to_string()),
        },
    }
}

pub fn merge_forwards(dev: &mut DevDescriptor, input: &SynthesisInput<'_>) -> Result<bool> {
    let added = assign_forwards(&dev.forward, &input.facts.ports)?;
    for forward in &added {
        input.logger.log_forward_added(forward.local, forward.remote);
    }
    dev.forward.extend_from_slice(&added);
    Ok(!added.is_empty())
}

/// Compute the forwards to append for `remote_ports`
///
/// Local ports start at the remote port, shifted by
/// [`PRIVILEGED_PORT_SHIFT`] when privileged, and move up until they clash
/// with no local port already in use. Remote ports that `existing` already
/// forwards are left alone; repeats within `remote_ports` each get their
/// own forward. The result depends only on the inputs and their order.
pub fn assign_forwards(existing: &[PortForward], remote_ports: &[u16]) -> Result<Vec<PortForward>> {
    let mut seen: HashSet<u16> = existing.iter().map(|f| f.local).collect();
    let forwarded: HashSet<u16> = existing.iter().map(|f| f.remote).collect();
    let mut added = Vec::new();

    for &remote in remote_ports {
        if forwarded.contains(&remote) {
            continue;
        }
        let mut local = if remote <= PRIVILEGED_PORT_MAX {
            remote + PRIVILEGED_PORT_SHIFT
        } else {
            remote
        };
        while seen.contains(&local) {
            local = local
                .checked_add(1)
                .ok_or(InferError::PortExhausted { remote })?;
        }
        seen.insert(local);
        added.push(PortForward::new(local, remote));
    }
    Ok(added)
}
