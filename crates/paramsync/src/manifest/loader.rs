use std::collections::BTreeSet;
use std::path::Path;

use crate::error::ManifestError;
use crate::manifest::schema::{DesiredConfigSpec, Manifest, ReplicationOnlyManifest};

const SCHEMA_JSON: &str = include_str!("../../schema/manifest-v1.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Yaml,
}

impl ManifestFormat {
    /// `.yaml` / `.yml` files are YAML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ManifestFormat::Yaml,
            _ => ManifestFormat::Json,
        }
    }
}

pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<DesiredConfigSpec, ManifestError> {
    let path = path.as_ref();
    let content = read(path)?;
    load_manifest_from_str(&content, ManifestFormat::from_path(path))
}

pub fn load_manifest_from_str(
    content: &str,
    format: ManifestFormat,
) -> Result<DesiredConfigSpec, ManifestError> {
    let value = parse_value(content, format)?;
    validate_schema(&value)?;

    let manifest: Manifest = serde_json::from_value(value)?;
    validate_manifest(&manifest)?;

    let spec = DesiredConfigSpec::from_manifest(manifest)?;
    tracing::debug!(
        namespace = %spec.namespace,
        config = spec.config_keys.len(),
        replications = spec.replication_pairs().len(),
        merges = spec.merge_map.len(),
        "Loaded manifest"
    );
    Ok(spec)
}

/// Loads a replication-only file (`{"replicate_figs": {...}}`).
pub fn load_replication_file<P: AsRef<Path>>(
    path: P,
) -> Result<ReplicationOnlyManifest, ManifestError> {
    let path = path.as_ref();
    let content = read(path)?;
    let value = parse_value(&content, ManifestFormat::from_path(path))?;
    validate_schema(&value)?;

    let manifest: ReplicationOnlyManifest = serde_json::from_value(value)?;
    if manifest.replicate_figs.is_empty() {
        return Err(ManifestError::Validation {
            message: format!("'{}' declares no replicate_figs", path.display()),
        });
    }
    Ok(manifest)
}

fn read(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|e| ManifestError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_value(content: &str, format: ManifestFormat) -> Result<serde_json::Value, ManifestError> {
    match format {
        ManifestFormat::Json => Ok(serde_json::from_str(content)?),
        ManifestFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ManifestError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ManifestError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ManifestError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(ManifestError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Cross-field checks the schema cannot express. All problems are
/// reported together.
fn validate_manifest(manifest: &Manifest) -> Result<(), ManifestError> {
    let mut errors = Vec::new();

    let config: BTreeSet<&str> = manifest.config.iter().map(String::as_str).collect();

    for name in &manifest.shared {
        if config.contains(name.as_str()) {
            errors.push(format!("'{}' is declared both as config and as shared", name));
        }
    }

    for destination in manifest.replicate_figs.values() {
        if config.contains(destination.as_str()) {
            errors.push(format!(
                "'{}' is declared both as config and as a replication destination",
                destination
            ));
        }
    }

    for destination in manifest.merge_parameters.keys() {
        if config.contains(destination.as_str()) {
            errors.push(format!(
                "'{}' is declared both as config and as a merge parameter",
                destination
            ));
        }
        if manifest
            .replicate_figs
            .values()
            .any(|d| d == destination)
        {
            errors.push(format!(
                "'{}' is both a replication destination and a merge parameter",
                destination
            ));
        }
    }

    let mut destinations = BTreeSet::new();
    for destination in manifest.replicate_figs.values() {
        if !destinations.insert(destination.as_str()) {
            errors.push(format!(
                "'{}' is the destination of more than one replication",
                destination
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ManifestError::Validation {
            message: errors.join("; "),
        })
    }
}
