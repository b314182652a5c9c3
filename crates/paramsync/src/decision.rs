//! Interactive choices, abstracted so the engine can run headless.
//!
//! The engine never reads from a terminal. Whenever it needs a value or a
//! confirmation it asks a [`Decision`]. The CLI answers with prompts;
//! tests and unattended runs answer from a script.

use std::collections::VecDeque;

use crate::model::{ParameterType, ReplicationMapping};

/// Everything needed to create a parameter that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParameter {
    pub value: String,
    pub description: String,
    pub kind: ParameterType,
    pub kms_key_id: Option<String>,
}

impl NewParameter {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: String::new(),
            kind: ParameterType::String,
            kms_key_id: None,
        }
    }

    pub fn secure(value: impl Into<String>, kms_key_id: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: String::new(),
            kind: ParameterType::SecureString,
            kms_key_id: Some(kms_key_id.into()),
        }
    }
}

/// A yes/no question and what it is about.
#[derive(Debug, Clone, Copy)]
pub enum Confirm<'a> {
    /// Deleting `name` also removes the mapping that feeds it.
    DeleteReplicatedParameter {
        name: &'a str,
        mapping: &'a ReplicationMapping,
    },
    DeleteStrayParameter {
        name: &'a str,
    },
    DeleteStrayMapping {
        mapping: &'a ReplicationMapping,
    },
    /// `name` exists now but was deleted at the restore point.
    DeleteForRestore {
        name: &'a str,
    },
    /// Start a point-in-time restore of `count` parameters under `prefix`.
    StartRestore {
        prefix: &'a str,
        count: usize,
    },
    RestoreVersion {
        name: &'a str,
        version: u64,
    },
    Promote {
        name: &'a str,
        target_env: &'a str,
    },
}

impl Confirm<'_> {
    /// Answer used when the user just presses enter.
    pub fn default_answer(&self) -> bool {
        matches!(self, Confirm::Promote { .. } | Confirm::StartRestore { .. })
    }

    pub fn prompt(&self) -> String {
        match self {
            Confirm::DeleteReplicatedParameter { name, mapping } => format!(
                "'{}' is replicated from {}. Delete both the shared mapping and the parameter?",
                name, mapping.source
            ),
            Confirm::DeleteStrayParameter { name } => {
                format!("'{}' is not declared in the manifest. Delete it?", name)
            }
            Confirm::DeleteStrayMapping { mapping } => format!(
                "Mapping {} is not declared in the manifest. Delete it?",
                mapping
            ),
            Confirm::DeleteForRestore { name } => format!(
                "'{}' did not exist at the restore point. Delete it?",
                name
            ),
            Confirm::StartRestore { prefix, count } => format!(
                "Restore {} parameter(s) under '{}'?",
                count, prefix
            ),
            Confirm::RestoreVersion { name, version } => {
                format!("Restore '{}' to version {}?", name, version)
            }
            Confirm::Promote { name, target_env } => {
                format!("Promote '{}' to {}?", name, target_env)
            }
        }
    }
}

/// One historical version offered for a single-parameter restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreCandidate {
    pub version: u64,
    pub time: chrono::DateTime<chrono::Utc>,
    pub user: String,
    /// `None` when the value cannot be decrypted by the caller.
    pub value: Option<String>,
}

pub trait Decision {
    /// Value for a parameter that must be created. `None` declines.
    fn new_parameter(&mut self, name: &str) -> Option<NewParameter>;

    fn confirm(&mut self, question: Confirm<'_>) -> bool;

    /// Value for a `${NAME}` placeholder in a replication file. `None` or an
    /// empty answer leaves the placeholder unresolved.
    fn placeholder_value(&mut self, placeholder: &str) -> Option<String>;

    /// Index into `candidates` of the version to restore. `None` declines.
    fn select_version(&mut self, name: &str, candidates: &[RestoreCandidate]) -> Option<usize>;
}

/// A queued answer for [`ScriptedDecision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Parameter(Option<NewParameter>),
    Confirm(bool),
    Text(String),
    Select(Option<usize>),
}

/// Answers from a fixed script, in order. When the script runs out, or
/// the next answer does not fit the question, the conservative answer is
/// given: decline, do not delete, no text. Every question asked is
/// recorded.
#[derive(Debug, Default)]
pub struct ScriptedDecision {
    answers: VecDeque<Answer>,
    asked: Vec<String>,
}

impl ScriptedDecision {
    pub fn new<I: IntoIterator<Item = Answer>>(answers: I) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Declines everything.
    pub fn declining() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_matching<T>(&mut self, pick: impl FnOnce(&Answer) -> Option<T>) -> Option<T> {
        let answer = self.answers.front()?;
        let picked = pick(answer)?;
        self.answers.pop_front();
        Some(picked)
    }
}

impl Decision for ScriptedDecision {
    fn new_parameter(&mut self, name: &str) -> Option<NewParameter> {
        self.asked.push(format!("new parameter {}", name));
        self.next_matching(|a| match a {
            Answer::Parameter(p) => Some(p.clone()),
            _ => None,
        })
        .flatten()
    }

    fn confirm(&mut self, question: Confirm<'_>) -> bool {
        self.asked.push(question.prompt());
        self.next_matching(|a| match a {
            Answer::Confirm(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(false)
    }

    fn placeholder_value(&mut self, placeholder: &str) -> Option<String> {
        self.asked.push(format!("placeholder {}", placeholder));
        self.next_matching(|a| match a {
            Answer::Text(t) => Some(t.clone()),
            _ => None,
        })
    }

    fn select_version(&mut self, name: &str, candidates: &[RestoreCandidate]) -> Option<usize> {
        self.asked
            .push(format!("select version of {} ({} candidates)", name, candidates.len()));
        self.next_matching(|a| match a {
            Answer::Select(s) => Some(*s),
            _ => None,
        })
        .flatten()
        .filter(|i| *i < candidates.len())
    }
}
