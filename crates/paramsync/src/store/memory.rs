//! In-memory store used for headless runs and tests.
//!
//! Keeps the same observable contract as a real store: every put bumps the
//! version and appends to the audit log, deletes append a `DELETE` entry and
//! the name change feed records the latest state per name. A logical clock
//! advances one millisecond per mutation so audit ordering is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use super::{matches_depth, AccessPolicy, ListDepth, RemoteStore, StoreError, StoreResult};
use crate::model::{
    AuditAction, AuditEntry, NameChange, NameState, Parameter, PutParameter, ReplicationMapping,
};

#[derive(Debug, Default)]
struct MemoryState {
    parameters: BTreeMap<String, Parameter>,
    history: Vec<AuditEntry>,
    name_changes: BTreeMap<String, NameChange>,
    mappings: BTreeMap<String, ReplicationMapping>,
    clock: Option<DateTime<Utc>>,
    denied_prefixes: BTreeSet<String>,
    decrypt_denied: BTreeSet<String>,
    transport_failure: Option<String>,
    mutations: usize,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        let next = self.clock.unwrap_or_else(Utc::now) + Duration::milliseconds(1);
        self.clock = Some(next);
        next
    }

    fn check_transport(&self) -> StoreResult<()> {
        match &self.transport_failure {
            Some(message) => Err(StoreError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    fn check_denied(&self, name: &str) -> StoreResult<()> {
        if self.denied_prefixes.iter().any(|p| name.starts_with(p)) {
            return Err(StoreError::access_denied(name, "explicitly denied"));
        }
        Ok(())
    }
}

pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    policy: AccessPolicy,
    user: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            policy: AccessPolicy::allow_all(),
            user: "paramsync".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Identity recorded on audit entries written through this store.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pins the logical clock. The next mutation happens 1ms after `at`.
    pub fn set_time(&self, at: DateTime<Utc>) {
        self.state().clock = Some(at);
    }

    /// Current value of the logical clock.
    pub fn now(&self) -> DateTime<Utc> {
        let state = self.state();
        state.clock.unwrap_or_else(Utc::now)
    }

    /// Every operation on names under `prefix` fails with `AccessDenied`.
    pub fn deny(&self, prefix: impl Into<String>) {
        self.state().denied_prefixes.insert(prefix.into());
    }

    /// The named encrypted parameter exists but cannot be decrypted.
    pub fn deny_decrypt(&self, name: impl Into<String>) {
        self.state().decrypt_denied.insert(name.into());
    }

    /// Makes every call fail as if the store were unreachable.
    pub fn fail_transport(&self, message: Option<&str>) {
        self.state().transport_failure = message.map(str::to_string);
    }

    /// Number of state-changing calls served so far.
    pub fn mutation_count(&self) -> usize {
        self.state().mutations
    }

    pub fn names(&self) -> Vec<String> {
        self.state().parameters.keys().cloned().collect()
    }

    pub fn mappings(&self) -> Vec<ReplicationMapping> {
        self.state().mappings.values().cloned().collect()
    }

    /// Full audit log, oldest first.
    pub fn history(&self) -> Vec<AuditEntry> {
        self.state().history.clone()
    }
}

impl RemoteStore for InMemoryStore {
    fn get(&self, name: &str) -> StoreResult<Option<Parameter>> {
        let state = self.state();
        state.check_transport()?;
        self.policy.check(name)?;
        state.check_denied(name)?;

        match state.parameters.get(name) {
            None => Ok(None),
            Some(param) if param.kind.is_encrypted() && state.decrypt_denied.contains(name) => {
                Err(StoreError::EncryptionContextDenied {
                    name: name.to_string(),
                })
            }
            Some(param) => Ok(Some(param.clone())),
        }
    }

    fn put(&self, request: &PutParameter) -> StoreResult<u64> {
        let mut state = self.state();
        state.check_transport()?;
        self.policy.check(&request.name)?;
        state.check_denied(&request.name)?;

        let version = state
            .parameters
            .get(&request.name)
            .map(|p| p.version + 1)
            .unwrap_or(1);
        let time = state.tick();

        state.parameters.insert(
            request.name.clone(),
            Parameter {
                name: request.name.clone(),
                value: request.value.clone(),
                description: request.description.clone(),
                kind: request.kind,
                kms_key_id: request.kms_key_id.clone(),
                version,
                last_modified: time,
            },
        );
        state.history.push(AuditEntry {
            parameter_name: request.name.clone(),
            time,
            action: AuditAction::Put,
            value: Some(request.value.clone()),
            description: request.description.clone(),
            kind: request.kind,
            kms_key_id: request.kms_key_id.clone(),
            version,
            user: self.user.clone(),
        });
        state.name_changes.insert(
            request.name.clone(),
            NameChange {
                name: request.name.clone(),
                state: NameState::Active,
                time,
            },
        );
        state.mutations += 1;
        Ok(version)
    }

    fn delete(&self, name: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.check_transport()?;
        self.policy.check(name)?;
        state.check_denied(name)?;

        let removed = state
            .parameters
            .remove(name)
            .ok_or_else(|| StoreError::not_found(name))?;
        let time = state.tick();

        state.history.push(AuditEntry {
            parameter_name: name.to_string(),
            time,
            action: AuditAction::Delete,
            value: None,
            description: removed.description,
            kind: removed.kind,
            kms_key_id: removed.kms_key_id,
            version: removed.version,
            user: self.user.clone(),
        });
        state.name_changes.insert(
            name.to_string(),
            NameChange {
                name: name.to_string(),
                state: NameState::Deleted,
                time,
            },
        );
        state.mutations += 1;
        Ok(())
    }

    fn list_under_prefix(&self, prefix: &str, depth: ListDepth) -> StoreResult<Vec<String>> {
        let state = self.state();
        state.check_transport()?;
        self.policy.check(prefix)?;
        state.check_denied(prefix)?;

        Ok(state
            .parameters
            .keys()
            .filter(|name| matches_depth(name, prefix, depth))
            .cloned()
            .collect())
    }

    fn list_all_names_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<NameChange>> {
        let state = self.state();
        state.check_transport()?;
        Ok(state
            .name_changes
            .values()
            .filter(|c| c.time >= since)
            .cloned()
            .collect())
    }

    fn get_history_before(&self, at: DateTime<Utc>, prefix: &str) -> StoreResult<Vec<AuditEntry>> {
        let state = self.state();
        state.check_transport()?;
        self.policy.check(prefix)?;
        Ok(state
            .history
            .iter()
            .filter(|e| e.time <= at && e.parameter_name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn parameter_history(&self, name: &str) -> StoreResult<Vec<AuditEntry>> {
        let state = self.state();
        state.check_transport()?;
        self.policy.check(name)?;
        state.check_denied(name)?;
        Ok(state
            .history
            .iter()
            .filter(|e| e.parameter_name == name)
            .cloned()
            .collect())
    }

    fn decrypt_history(&self, entry: &AuditEntry) -> StoreResult<String> {
        let state = self.state();
        state.check_transport()?;
        if entry.is_encrypted() && state.decrypt_denied.contains(&entry.parameter_name) {
            return Err(StoreError::EncryptionContextDenied {
                name: entry.parameter_name.clone(),
            });
        }
        entry
            .value
            .clone()
            .ok_or_else(|| StoreError::not_found(&entry.parameter_name))
    }

    fn mappings_by_source(&self, name: &str) -> StoreResult<Vec<ReplicationMapping>> {
        let state = self.state();
        state.check_transport()?;
        Ok(state
            .mappings
            .values()
            .filter(|m| m.reads_from(name))
            .cloned()
            .collect())
    }

    fn mapping_by_destination(&self, name: &str) -> StoreResult<Option<ReplicationMapping>> {
        let state = self.state();
        state.check_transport()?;
        Ok(state.mappings.get(name).cloned())
    }

    fn put_mapping(&self, mapping: &ReplicationMapping) -> StoreResult<()> {
        let mut state = self.state();
        state.check_transport()?;
        state.check_denied(&mapping.destination)?;
        state
            .mappings
            .insert(mapping.destination.clone(), mapping.clone());
        state.mutations += 1;
        Ok(())
    }

    fn delete_mapping(&self, destination: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.check_transport()?;
        state.check_denied(destination)?;
        if state.mappings.remove(destination).is_some() {
            state.mutations += 1;
        }
        Ok(())
    }

    fn list_mappings_under_namespace(
        &self,
        namespace: &str,
    ) -> StoreResult<Vec<ReplicationMapping>> {
        let state = self.state();
        state.check_transport()?;
        Ok(state
            .mappings
            .values()
            .filter(|m| m.destination.starts_with(namespace))
            .cloned()
            .collect())
    }
}
