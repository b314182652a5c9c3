//! Namespace rules for replication edges.
//!
//! A destination must lie inside the consuming namespace. An application
//! source must come from the shared tree or from the consuming namespace
//! itself. Each violation rejects only the record it was found on.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParamSyncError;
use crate::manifest::references;
use crate::model::{parse_namespace, MappingSource};

static RE_SHARED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/shared/.*$").unwrap());

/// Roots of the two trees a service may pull from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRules {
    /// Root of every service namespace, `/app/` by default.
    pub service_root: String,
    /// Root of the shared tree, `/shared/` by default.
    pub shared_root: String,
}

impl Default for NamespaceRules {
    fn default() -> Self {
        Self {
            service_root: "/app/".to_string(),
            shared_root: "/shared/".to_string(),
        }
    }
}

impl NamespaceRules {
    /// The service namespace a destination belongs to. The destination must
    /// actually start with it: `//app/x/db` parses to `/app/x/` but lies
    /// outside it.
    pub fn destination_namespace(&self, destination: &str) -> Result<String, ParamSyncError> {
        let namespace = parse_namespace(destination)
            .filter(|ns| ns.starts_with(&self.service_root))
            .ok_or_else(|| {
                ParamSyncError::namespace_violation(
                    destination,
                    self.service_root.as_str(),
                    "replication destination must be inside a service namespace",
                )
            })?;
        ReplicationGraphValidator::check_destination(destination, &namespace)?;
        Ok(namespace)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationGraphValidator;

impl ReplicationGraphValidator {
    pub fn valid_destination(destination: &str, namespace: &str) -> bool {
        destination.starts_with(namespace)
    }

    pub fn valid_source(source: &str, namespace: &str, is_app_config: bool) -> bool {
        !is_app_config || RE_SHARED.is_match(source) || source.starts_with(namespace)
    }

    pub fn check_destination(destination: &str, namespace: &str) -> Result<(), ParamSyncError> {
        if Self::valid_destination(destination, namespace) {
            Ok(())
        } else {
            Err(ParamSyncError::namespace_violation(
                destination,
                namespace,
                "replication destination must be inside the namespace",
            ))
        }
    }

    pub fn check_source(
        source: &str,
        namespace: &str,
        is_app_config: bool,
    ) -> Result<(), ParamSyncError> {
        if Self::valid_source(source, namespace, is_app_config) {
            Ok(())
        } else {
            Err(ParamSyncError::namespace_violation(
                source,
                namespace,
                "replication source must be under /shared/ or inside the namespace",
            ))
        }
    }

    /// Every parameter a merge value reads must be a valid application
    /// source: each `${/name}` reference, and any fragment that is itself a
    /// bare parameter path.
    pub fn check_merge_source(
        source: &MappingSource,
        namespace: &str,
    ) -> Result<(), ParamSyncError> {
        for fragment in source.fragments() {
            let mut referenced = false;
            for name in references(fragment) {
                referenced = true;
                Self::check_source(name, namespace, true)?;
            }
            if !referenced && fragment.starts_with('/') {
                Self::check_source(fragment, namespace, true)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "/app/x/";

    #[test]
    fn test_valid_destination() {
        assert!(ReplicationGraphValidator::valid_destination("/app/x/a", NS));
        assert!(!ReplicationGraphValidator::valid_destination("/app/y/a", NS));
        assert!(!ReplicationGraphValidator::valid_destination("/app/xy/a", NS));
    }

    #[test]
    fn test_valid_source() {
        assert!(ReplicationGraphValidator::valid_source("/shared/db/host", NS, true));
        assert!(ReplicationGraphValidator::valid_source("/app/x/a", NS, true));
        assert!(!ReplicationGraphValidator::valid_source("/app/y/a", NS, true));
        assert!(!ReplicationGraphValidator::valid_source("/sharedx/a", NS, true));
        // Only application configs are restricted.
        assert!(ReplicationGraphValidator::valid_source("/app/y/a", NS, false));
    }

    #[test]
    fn test_merge_source_checks_references() {
        let ok = MappingSource::Composite(vec![
            "postgres://".to_string(),
            "${/shared/db/user}".to_string(),
            ":".to_string(),
            "${/app/x/pass:uri}".to_string(),
        ]);
        assert!(ReplicationGraphValidator::check_merge_source(&ok, NS).is_ok());

        let bad = MappingSource::Single("${/app/other/pass}".to_string());
        assert!(matches!(
            ReplicationGraphValidator::check_merge_source(&bad, NS),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));
    }

    #[test]
    fn test_merge_source_checks_bare_paths() {
        let foreign = MappingSource::Single("/app/other/secret".to_string());
        assert!(matches!(
            ReplicationGraphValidator::check_merge_source(&foreign, NS),
            Err(ParamSyncError::NamespaceViolation { .. })
        ));

        let foreign_item = MappingSource::Composite(vec![
            "${/shared/db/user}".to_string(),
            "/app/other/pass".to_string(),
        ]);
        assert!(ReplicationGraphValidator::check_merge_source(&foreign_item, NS).is_err());

        let own = MappingSource::Single("/app/x/pass".to_string());
        assert!(ReplicationGraphValidator::check_merge_source(&own, NS).is_ok());
        let literal = MappingSource::Single("redis://cache:6379".to_string());
        assert!(ReplicationGraphValidator::check_merge_source(&literal, NS).is_ok());
    }

    #[test]
    fn test_destination_namespace() {
        let rules = NamespaceRules::default();
        assert_eq!(rules.destination_namespace("/app/x/db").unwrap(), "/app/x/");
        assert!(rules.destination_namespace("//app/x/db").is_err());
        assert!(rules.destination_namespace("/app//db").is_err());
        assert!(rules.destination_namespace("/shared/a/b").is_err());
    }
}
