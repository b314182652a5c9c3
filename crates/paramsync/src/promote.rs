//! Copies parameters from one environment's store into another's.

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::cache::{ClientKey, ClientRegistry};
use crate::decision::{Confirm, Decision};
use crate::error::ParamSyncError;
use crate::model::{ParameterType, PutParameter};
use crate::store::{ListDepth, RemoteStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteRequest {
    /// A prefix, or the exact name of a single parameter.
    pub prefix: String,
    pub from_env: String,
    pub to_env: String,
    /// Registry role used for both stores.
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteReport {
    pub promoted: Vec<String>,
    pub declined: Vec<String>,
    /// Encrypted values are bound to the source key ring.
    pub skipped_secure: Vec<String>,
    pub denied: Vec<String>,
}

pub fn promote(
    registry: &ClientRegistry,
    request: &PromoteRequest,
    decision: &mut dyn Decision,
) -> Result<PromoteReport, ParamSyncError> {
    let _span = info_span!(
        "promote",
        prefix = %request.prefix,
        from = %request.from_env,
        to = %request.to_env
    )
    .entered();

    if request.from_env == request.to_env {
        return Err(ParamSyncError::InvalidInput(format!(
            "cannot promote '{}' into its own environment {}",
            request.prefix, request.from_env
        )));
    }

    let source = registry.for_env(&request.from_env, &request.role)?;
    let target = registry.for_env(&request.to_env, &request.role)?;
    let mut report = PromoteReport::default();

    for name in names_to_promote(source.as_ref(), &request.prefix)? {
        let parameter = match source.get(&name) {
            Ok(Some(parameter)) => parameter,
            Ok(None) => continue,
            Err(e) if e.is_record_scoped() => {
                warn!(name = %name, error = %e, "Cannot read parameter to promote");
                report.denied.push(name);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if parameter.kind == ParameterType::SecureString {
            warn!(name = %name, "Skipping SecureString, it cannot leave its key ring");
            report.skipped_secure.push(name);
            continue;
        }

        if !decision.confirm(Confirm::Promote {
            name: &name,
            target_env: &request.to_env,
        }) {
            report.declined.push(name);
            continue;
        }

        let put = PutParameter::plain(&name, parameter.value).with_description(parameter.description);
        match target.put(&put) {
            Ok(version) => {
                info!(name = %name, version, "Promoted parameter");
                report.promoted.push(name);
            }
            Err(e) if e.is_record_scoped() => {
                warn!(name = %name, error = %e, "Promotion denied");
                report.denied.push(name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(report)
}

/// A name that exists exactly is promoted alone; anything else is treated
/// as a prefix.
fn names_to_promote(store: &dyn RemoteStore, prefix: &str) -> Result<Vec<String>, ParamSyncError> {
    if !prefix.ends_with('/') && matches!(store.get(prefix), Ok(Some(_))) {
        return Ok(vec![prefix.to_string()]);
    }
    Ok(store.list_under_prefix(prefix, ListDepth::Recursive)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Answer, ScriptedDecision};
    use crate::store::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn registry(stores: &BTreeMap<&'static str, Arc<InMemoryStore>>) -> ClientRegistry {
        let stores: BTreeMap<String, Arc<InMemoryStore>> = stores
            .iter()
            .map(|(env, store)| (env.to_string(), Arc::clone(store)))
            .collect();
        ClientRegistry::new(
            4,
            Box::new(move |key: &ClientKey| {
                stores
                    .get(&key.env)
                    .map(|s| Arc::clone(s) as Arc<dyn RemoteStore>)
                    .ok_or_else(|| ParamSyncError::InvalidInput(key.env.clone()))
            }),
        )
    }

    fn request(prefix: &str, to: &str) -> PromoteRequest {
        PromoteRequest {
            prefix: prefix.to_string(),
            from_env: "dev".to_string(),
            to_env: to.to_string(),
            role: "admin".to_string(),
        }
    }

    #[test]
    fn test_promotes_plain_and_skips_secure() {
        let dev = Arc::new(InMemoryStore::new());
        let qa = Arc::new(InMemoryStore::new());
        dev.put(&PutParameter::plain("/app/x/a", "1").with_description("first"))
            .unwrap();
        dev.put(&PutParameter::secure("/app/x/s", "secret", "key-1"))
            .unwrap();
        dev.put(&PutParameter::plain("/app/x/b", "2")).unwrap();
        let registry = registry(&BTreeMap::from([("dev", dev), ("qa", Arc::clone(&qa))]));

        let mut decision = ScriptedDecision::new([Answer::Confirm(true), Answer::Confirm(false)]);
        let report = promote(&registry, &request("/app/x/", "qa"), &mut decision).unwrap();

        assert_eq!(report.promoted, vec!["/app/x/a"]);
        assert_eq!(report.declined, vec!["/app/x/b"]);
        assert_eq!(report.skipped_secure, vec!["/app/x/s"]);
        let promoted = qa.get("/app/x/a").unwrap().unwrap();
        assert_eq!(promoted.description, "first");
        assert_eq!(promoted.kind, ParameterType::String);
        assert!(qa.get("/app/x/b").unwrap().is_none());
    }

    #[test]
    fn test_exact_name_promotes_one() {
        let dev = Arc::new(InMemoryStore::new());
        let qa = Arc::new(InMemoryStore::new());
        dev.put(&PutParameter::plain("/app/x/a", "1")).unwrap();
        dev.put(&PutParameter::plain("/app/x/a/nested", "2")).unwrap();
        let registry = registry(&BTreeMap::from([("dev", dev), ("qa", Arc::clone(&qa))]));

        let mut decision = ScriptedDecision::new([Answer::Confirm(true), Answer::Confirm(true)]);
        let report = promote(&registry, &request("/app/x/a", "qa"), &mut decision).unwrap();
        assert_eq!(report.promoted, vec!["/app/x/a"]);
        assert_eq!(qa.names(), vec!["/app/x/a"]);
    }

    #[test]
    fn test_same_environment_rejected() {
        let dev = Arc::new(InMemoryStore::new());
        let registry = registry(&BTreeMap::from([("dev", dev)]));
        assert!(matches!(
            promote(&registry, &request("/app/x/", "dev"), &mut ScriptedDecision::declining()),
            Err(ParamSyncError::InvalidInput(_))
        ));
    }
}
