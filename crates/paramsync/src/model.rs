//! Core records exchanged with the remote parameter store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a parameter value is stored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    SecureString,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "String",
            ParameterType::SecureString => "SecureString",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "String" => Some(ParameterType::String),
            "SecureString" => Some(ParameterType::SecureString),
            _ => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, ParameterType::SecureString)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter as read back from the store, value already decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub description: String,
    pub kind: ParameterType,
    pub kms_key_id: Option<String>,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
}

/// A write request. Every put creates a new version of `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutParameter {
    pub name: String,
    pub value: String,
    pub description: String,
    pub kind: ParameterType,
    pub kms_key_id: Option<String>,
}

impl PutParameter {
    pub fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: String::new(),
            kind: ParameterType::String,
            kms_key_id: None,
        }
    }

    pub fn secure(
        name: impl Into<String>,
        value: impl Into<String>,
        kms_key_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: String::new(),
            kind: ParameterType::SecureString,
            kms_key_id: Some(kms_key_id.into()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Put,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Put => "PUT",
            AuditAction::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PUT" => Some(AuditAction::Put),
            "DELETE" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

/// One row of the append-only audit log.
///
/// `value` holds the stored form: ciphertext for `SecureString` entries,
/// which only the store that wrote it can decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub parameter_name: String,
    pub time: DateTime<Utc>,
    pub action: AuditAction,
    pub value: Option<String>,
    pub description: String,
    pub kind: ParameterType,
    pub kms_key_id: Option<String>,
    pub version: u64,
    pub user: String,
}

impl AuditEntry {
    pub fn is_encrypted(&self) -> bool {
        self.kind.is_encrypted()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationType {
    App,
    Merge,
}

impl ReplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationType::App => "APP",
            ReplicationType::Merge => "MERGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "APP" => Some(ReplicationType::App),
            "MERGE" => Some(ReplicationType::Merge),
            _ => None,
        }
    }
}

/// Source side of a mapping. Merge mappings may assemble their value from
/// several fragments, each either a literal or a `${/name}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingSource {
    Single(String),
    Composite(Vec<String>),
}

impl MappingSource {
    /// Every fragment of the source, in declaration order.
    pub fn fragments(&self) -> Vec<&str> {
        match self {
            MappingSource::Single(s) => vec![s.as_str()],
            MappingSource::Composite(items) => items.iter().map(String::as_str).collect(),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            MappingSource::Single(s) => Some(s),
            MappingSource::Composite(_) => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, MappingSource::Composite(_))
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSource::Single(s) => f.write_str(s),
            MappingSource::Composite(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for MappingSource {
    fn from(value: &str) -> Self {
        MappingSource::Single(value.to_string())
    }
}

/// A replication edge: the store copies `source` into `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationMapping {
    pub source: MappingSource,
    pub destination: String,
    pub namespace: String,
    pub kind: ReplicationType,
    pub env: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl ReplicationMapping {
    /// True when both mappings copy the same source into the same
    /// destination. Ownership metadata is ignored.
    pub fn same_route(&self, other: &ReplicationMapping) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.kind == other.kind
    }

    /// True when `name` is the source, or one of the referenced fragments of
    /// a merge source.
    pub fn reads_from(&self, name: &str) -> bool {
        match &self.source {
            MappingSource::Single(s) => s == name || crate::manifest::references(s).any(|r| r == name),
            MappingSource::Composite(items) => items
                .iter()
                .any(|i| i == name || crate::manifest::references(i).any(|r| r == name)),
        }
    }
}

impl fmt::Display for ReplicationMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}, by {})",
            self.source,
            self.destination,
            self.kind.as_str(),
            self.user
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NameState {
    Active,
    Deleted,
}

impl NameState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameState::Active => "ACTIVE",
            NameState::Deleted => "DELETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(NameState::Active),
            "DELETED" => Some(NameState::Deleted),
            _ => None,
        }
    }
}

/// An entry of the store's name change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameChange {
    pub name: String,
    pub state: NameState,
    pub time: DateTime<Utc>,
}

/// Returns the two-segment namespace a parameter belongs to, with a trailing
/// slash: `/app/billing/db/host` -> `/app/billing/`.
pub fn parse_namespace(name: &str) -> Option<String> {
    let mut segments = name.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    let second = segments.next()?;
    Some(format!("/{}/{}/", first, second))
}

/// Ensures a namespace prefix ends with `/` so `/app/x` never matches `/app/xy`.
pub fn normalize_namespace(namespace: &str) -> String {
    if namespace.ends_with('/') {
        namespace.to_string()
    } else {
        format!("{}/", namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespace() {
        assert_eq!(
            parse_namespace("/app/billing/db/host").as_deref(),
            Some("/app/billing/")
        );
        assert_eq!(parse_namespace("/app/x").as_deref(), Some("/app/x/"));
        assert_eq!(parse_namespace("/app"), None);
        assert_eq!(parse_namespace(""), None);
    }

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(normalize_namespace("/app/x"), "/app/x/");
        assert_eq!(normalize_namespace("/app/x/"), "/app/x/");
    }

    #[test]
    fn test_same_route_ignores_metadata() {
        let a = ReplicationMapping {
            source: "/shared/a".into(),
            destination: "/app/x/a".to_string(),
            namespace: "/app/x/".to_string(),
            kind: ReplicationType::App,
            env: "dev".to_string(),
            user: "alice".to_string(),
            timestamp: Utc::now(),
        };
        let mut b = a.clone();
        b.user = "bob".to_string();
        b.env = "qa".to_string();
        assert!(a.same_route(&b));

        b.source = "/shared/b".into();
        assert!(!a.same_route(&b));
    }

    #[test]
    fn test_reads_from_merge_reference() {
        let mapping = ReplicationMapping {
            source: MappingSource::Composite(vec![
                "postgres://".to_string(),
                "${/app/x/user}".to_string(),
                "@db".to_string(),
            ]),
            destination: "/app/x/url".to_string(),
            namespace: "/app/x/".to_string(),
            kind: ReplicationType::Merge,
            env: "dev".to_string(),
            user: "alice".to_string(),
            timestamp: Utc::now(),
        };
        assert!(mapping.reads_from("/app/x/user"));
        assert!(!mapping.reads_from("/app/x/pass"));
    }

    #[test]
    fn test_mapping_source_serde_untagged() {
        let single: MappingSource = serde_json::from_str("\"/shared/a\"").unwrap();
        assert_eq!(single, MappingSource::Single("/shared/a".to_string()));

        let list: MappingSource = serde_json::from_str("[\"a\", \"${/b}\"]").unwrap();
        assert!(list.is_composite());
        assert_eq!(list.fragments(), vec!["a", "${/b}"]);
    }
}
