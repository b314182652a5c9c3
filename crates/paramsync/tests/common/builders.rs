//! Builders for manifests, mappings and scripted answers.

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;

use paramsync::manifest::{load_manifest_from_str, DesiredConfigSpec, ManifestFormat};
use paramsync::{
    Confirm, Decision, MappingSource, NewParameter, ReplicationMapping, ReplicationType,
    RestoreCandidate,
};

use super::harness::{ENV, USER};

/// Builds a manifest and loads it through the same path as a file would.
pub struct ManifestBuilder {
    namespace: String,
    config: Vec<String>,
    shared: Vec<String>,
    replicate_figs: BTreeMap<String, String>,
    merge_parameters: BTreeMap<String, serde_json::Value>,
}

impl ManifestBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            config: Vec::new(),
            shared: Vec::new(),
            replicate_figs: BTreeMap::new(),
            merge_parameters: BTreeMap::new(),
        }
    }

    pub fn config(mut self, name: &str) -> Self {
        self.config.push(name.to_string());
        self
    }

    pub fn shared(mut self, name: &str) -> Self {
        self.shared.push(name.to_string());
        self
    }

    pub fn replicate(mut self, source: &str, destination: &str) -> Self {
        self.replicate_figs
            .insert(source.to_string(), destination.to_string());
        self
    }

    pub fn merge(mut self, destination: &str, fragments: &[&str]) -> Self {
        self.merge_parameters
            .insert(destination.to_string(), json!(fragments));
        self
    }

    pub fn to_json(&self) -> String {
        json!({
            "namespace": self.namespace,
            "config": self.config,
            "shared": self.shared,
            "replicate_figs": self.replicate_figs,
            "merge_parameters": self.merge_parameters,
        })
        .to_string()
    }

    pub fn build(self) -> DesiredConfigSpec {
        load_manifest_from_str(&self.to_json(), ManifestFormat::Json)
            .expect("Builder produced an invalid manifest")
    }
}

pub fn app_mapping(source: &str, destination: &str, namespace: &str) -> ReplicationMapping {
    ReplicationMapping {
        source: MappingSource::Single(source.to_string()),
        destination: destination.to_string(),
        namespace: namespace.to_string(),
        kind: ReplicationType::App,
        env: ENV.to_string(),
        user: USER.to_string(),
        timestamp: Utc::now(),
    }
}

/// Answers yes to everything and creates plain parameters valued after
/// their name. Records every question.
#[derive(Debug, Default)]
pub struct Agreeable {
    pub asked: Vec<String>,
}

impl Decision for Agreeable {
    fn new_parameter(&mut self, name: &str) -> Option<NewParameter> {
        self.asked.push(format!("value of {}", name));
        Some(NewParameter::plain(format!("value-of-{}", name)))
    }

    fn confirm(&mut self, question: Confirm<'_>) -> bool {
        self.asked.push(question.prompt());
        true
    }

    fn placeholder_value(&mut self, placeholder: &str) -> Option<String> {
        self.asked.push(format!("placeholder {}", placeholder));
        Some(placeholder.to_lowercase())
    }

    fn select_version(&mut self, name: &str, candidates: &[RestoreCandidate]) -> Option<usize> {
        self.asked.push(format!("version of {}", name));
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}
