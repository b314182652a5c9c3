use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::model::{normalize_namespace, parse_namespace, MappingSource};

/// A service manifest as written by its owners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub namespace: Option<String>,
    /// Parameters the service owns directly.
    #[serde(default)]
    pub config: Vec<String>,
    /// Parameters other teams share into this namespace.
    #[serde(default)]
    pub shared: Vec<String>,
    /// `source -> destination` replication edges.
    #[serde(default)]
    pub replicate_figs: BTreeMap<String, String>,
    #[serde(default)]
    pub repl_from: Option<ReplicateFrom>,
    /// `destination -> fragments` values assembled from other parameters.
    #[serde(default)]
    pub merge_parameters: BTreeMap<String, MappingSource>,
}

/// Pulls several parameters sharing one source prefix into the namespace
/// under the same relative names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateFrom {
    pub source: String,
    pub parameters: Vec<String>,
}

/// Input of a replication-only run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationOnlyManifest {
    pub replicate_figs: BTreeMap<String, String>,
}

/// The resolved desired state of one namespace. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredConfigSpec {
    pub namespace: String,
    pub config_keys: BTreeSet<String>,
    pub shared_names: BTreeSet<String>,
    pub replication_map: BTreeMap<String, String>,
    pub repl_from: Option<ReplicateFrom>,
    pub merge_map: BTreeMap<String, MappingSource>,
}

impl DesiredConfigSpec {
    pub fn from_manifest(manifest: Manifest) -> Result<Self, ManifestError> {
        let namespace = match &manifest.namespace {
            Some(ns) => normalize_namespace(ns),
            None => manifest
                .config
                .first()
                .and_then(|name| parse_namespace(name))
                .ok_or_else(|| ManifestError::Validation {
                    message: "namespace is not set and cannot be derived from config".to_string(),
                })?,
        };

        Ok(Self {
            namespace,
            config_keys: manifest.config.into_iter().collect(),
            shared_names: manifest.shared.into_iter().collect(),
            replication_map: manifest.replicate_figs,
            repl_from: manifest.repl_from,
            merge_map: manifest.merge_parameters,
        })
    }

    /// Every `source -> destination` edge, including those expanded from
    /// `repl_from`.
    pub fn replication_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = self.replication_map.clone();
        if let Some(from) = &self.repl_from {
            let source_prefix = normalize_namespace(&from.source);
            for param in &from.parameters {
                let relative = param.trim_start_matches('/');
                pairs.insert(
                    format!("{}{}", source_prefix, relative),
                    format!("{}{}", self.namespace, relative),
                );
            }
        }
        pairs
    }

    pub fn replication_destinations(&self) -> BTreeSet<String> {
        self.replication_pairs().into_values().collect()
    }

    /// Names that must exist once the run has converged.
    pub fn expected_names(&self) -> BTreeSet<String> {
        let mut names = self.config_keys.clone();
        names.extend(self.shared_names.iter().cloned());
        names.extend(self.merge_map.keys().cloned());
        names.extend(self.replication_destinations());
        names
    }

    /// True when `name` will be filled by the replication service rather
    /// than written by the owner.
    pub fn is_replication_target(&self, name: &str) -> bool {
        self.merge_map.contains_key(name) || self.replication_destinations().contains(name)
    }

    /// True when `name` is interpolated by any declared merge value.
    pub fn interpolated_in_merge(&self, name: &str) -> bool {
        self.merge_map.values().any(|source| {
            source
                .fragments()
                .iter()
                .any(|fragment| super::interpolates(fragment, name))
        })
    }
}
