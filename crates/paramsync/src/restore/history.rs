use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{AuditAction, AuditEntry};

/// Audit entries of one parameter, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterHistory {
    pub name: String,
    entries: Vec<AuditEntry>,
}

impl ParameterHistory {
    /// Groups a flat audit listing per name and orders each history by
    /// time. Entries sharing a timestamp keep the store's log order:
    /// versions restart after a delete, so they cannot break the tie.
    pub fn group(entries: Vec<AuditEntry>) -> BTreeMap<String, ParameterHistory> {
        let mut grouped: BTreeMap<String, ParameterHistory> = BTreeMap::new();
        for entry in entries {
            grouped
                .entry(entry.parameter_name.clone())
                .or_insert_with(|| ParameterHistory {
                    name: entry.parameter_name.clone(),
                    entries: Vec::new(),
                })
                .entries
                .push(entry);
        }
        for history in grouped.values_mut() {
            history.entries.sort_by_key(|e| e.time);
        }
        grouped
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// The entry in effect at `at`: the latest one at or before it.
    pub fn entry_at(&self, at: DateTime<Utc>) -> Option<&AuditEntry> {
        self.entries.iter().rev().find(|e| e.time <= at)
    }

    /// Every PUT at or before `at`, oldest first.
    pub fn puts_at_or_before(&self, at: DateTime<Utc>) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(move |e| e.action == AuditAction::Put && e.time <= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterType;
    use chrono::Duration;

    fn entry(name: &str, action: AuditAction, version: u64, time: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            parameter_name: name.to_string(),
            time,
            action,
            value: (action == AuditAction::Put).then(|| format!("v{}", version)),
            description: String::new(),
            kind: ParameterType::String,
            kms_key_id: None,
            version,
            user: "alice".to_string(),
        }
    }

    #[test]
    fn test_entry_at_picks_latest_before() {
        let t0 = Utc::now();
        let history = ParameterHistory::group(vec![
            entry("/a", AuditAction::Put, 2, t0 + Duration::seconds(2)),
            entry("/a", AuditAction::Put, 1, t0),
            entry("/a", AuditAction::Delete, 2, t0 + Duration::seconds(4)),
            entry("/b", AuditAction::Put, 1, t0),
        ]);
        let a = &history["/a"];

        assert_eq!(a.entry_at(t0 + Duration::seconds(1)).unwrap().version, 1);
        assert_eq!(a.entry_at(t0 + Duration::seconds(3)).unwrap().version, 2);
        assert_eq!(
            a.entry_at(t0 + Duration::seconds(5)).unwrap().action,
            AuditAction::Delete
        );
        assert!(a.entry_at(t0 - Duration::seconds(1)).is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_same_instant_keeps_log_order() {
        // A restore deletes and replays within one clock tick.
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let history = ParameterHistory::group(vec![
            entry("/a", AuditAction::Put, 1, t0),
            entry("/a", AuditAction::Put, 2, t0),
            entry("/a", AuditAction::Delete, 2, t1),
            entry("/a", AuditAction::Put, 1, t1),
        ]);

        let latest = history["/a"].entry_at(t1).unwrap();
        assert_eq!(latest.action, AuditAction::Put);
        assert_eq!(latest.version, 1);
        assert_eq!(history["/a"].entry_at(t0).unwrap().version, 2);
    }

    #[test]
    fn test_puts_at_or_before() {
        let t0 = Utc::now();
        let history = ParameterHistory::group(vec![
            entry("/a", AuditAction::Put, 1, t0),
            entry("/a", AuditAction::Delete, 1, t0 + Duration::seconds(1)),
            entry("/a", AuditAction::Put, 1, t0 + Duration::seconds(2)),
            entry("/a", AuditAction::Put, 2, t0 + Duration::seconds(3)),
        ]);
        let versions: Vec<u64> = history["/a"]
            .puts_at_or_before(t0 + Duration::seconds(2))
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![1, 1]);
    }
}
