//! Service manifests: the declared configuration of one namespace.

use std::sync::LazyLock;

use regex::Regex;

pub mod loader;
pub mod schema;
pub mod template;

pub use loader::{load_manifest, load_manifest_from_str, load_replication_file, ManifestFormat};
pub use schema::{DesiredConfigSpec, Manifest, ReplicateFrom, ReplicationOnlyManifest};
pub use template::{fill_placeholders, placeholders};

/// A reference to another parameter inside a merge value: `${/name}` or
/// `${/name:uri}`.
static RE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(/[^}:]+)(?::uri)?\}").unwrap());

/// Suffixes a merge value may append to a reference.
const MERGE_SUFFIXES: [&str; 2] = [":uri", ""];

/// Names referenced by a merge fragment, in order of appearance.
pub fn references(fragment: &str) -> impl Iterator<Item = &str> {
    RE_REFERENCE
        .captures_iter(fragment)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// True when `name` is interpolated anywhere in `fragment`.
pub fn interpolates(fragment: &str, name: &str) -> bool {
    MERGE_SUFFIXES
        .iter()
        .any(|suffix| fragment.contains(&format!("${{{}{}}}", name, suffix)))
}
