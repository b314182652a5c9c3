//! Differences between the declared and the remote state of a namespace.

use std::collections::BTreeSet;

use crate::manifest::DesiredConfigSpec;
use crate::model::{ReplicationMapping, ReplicationType};
use crate::replication::NamespaceRules;

/// Remote names under the namespace that the manifest does not expect.
pub fn stray_keys<I>(spec: &DesiredConfigSpec, remote_names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let expected = spec.expected_names();
    remote_names
        .into_iter()
        .filter(|name| !expected.contains(name))
        .collect()
}

/// Remote mappings into the namespace that nothing in the manifest accounts
/// for: neither the source is declared, nor the destination is a declared
/// replication target, shared name, merge key, or merge interpolation.
pub fn stray_mappings(
    spec: &DesiredConfigSpec,
    remote: Vec<ReplicationMapping>,
) -> Vec<ReplicationMapping> {
    let pairs = spec.replication_pairs();
    let destinations: BTreeSet<&String> = pairs.values().collect();

    remote
        .into_iter()
        .filter(|mapping| {
            let source_declared = mapping
                .source
                .as_single()
                .is_some_and(|source| pairs.contains_key(source));
            let destination = &mapping.destination;
            let destination_declared = destinations.contains(destination)
                || spec.shared_names.contains(destination)
                || spec.merge_map.contains_key(destination)
                || spec.interpolated_in_merge(destination);
            !source_declared && !destination_declared
        })
        .collect()
}

/// Application mappings whose source is neither declared in a replication
/// file nor under one of the managed roots.
pub fn stray_app_mappings(
    remote: Vec<ReplicationMapping>,
    declared_sources: &BTreeSet<String>,
    rules: &NamespaceRules,
) -> Vec<ReplicationMapping> {
    remote
        .into_iter()
        .filter(|mapping| mapping.kind == ReplicationType::App)
        .filter(|mapping| match mapping.source.as_single() {
            Some(source) => {
                !declared_sources.contains(source)
                    && !source.starts_with(&rules.shared_root)
                    && !source.starts_with(&rules.service_root)
            }
            None => false,
        })
        .collect()
}
