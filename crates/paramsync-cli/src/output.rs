//! Human and JSON rendering of command results.

use clap::ValueEnum;
use console::style;
use paramsync::guard::{DeleteOutcome, RefusalReason};
use paramsync::orphans::{PruneReport, ValidationReport};
use paramsync::promote::PromoteReport;
use paramsync::restore::RestoreReport;
use paramsync::sync::ReconciliationReport;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Something a command prints when it is done.
pub trait Render: Serialize {
    fn render_text(&self);
}

pub fn emit<T: Render>(format: OutputFormat, value: &T) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => value.render_text(),
    }
    Ok(())
}

fn list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", style(title).bold());
    for item in items {
        println!("  {}", item);
    }
}

impl Render for ReconciliationReport {
    fn render_text(&self) {
        println!(
            "Backfilled {} parameter(s), {} replication source(s)",
            self.backfilled, self.sources_backfilled
        );
        println!(
            "Replications: {} added, {} updated, {} validated",
            self.replications_added, self.replications_updated, self.replications_validated
        );
        println!(
            "Merge keys: {} added, {} updated, {} validated",
            self.merges_added, self.merges_updated, self.merges_validated
        );
        list("Stray parameters:", &self.stray_keys);
        let stray: Vec<String> = self.stray_mappings.iter().map(|m| m.to_string()).collect();
        list("Stray replication mappings:", &stray);
        list("Awaiting replication:", &self.awaiting_replication);
        let denied: Vec<String> = self.access_denied.iter().cloned().collect();
        list("Access denied:", &denied);

        if self.errors.is_empty() {
            println!("{}", style("No errors").green());
        } else {
            println!("{}", style(format!("{} error(s):", self.errors.len())).red().bold());
            for error in &self.errors {
                println!("  {} {:?}: {}", error.subject, error.kind, error.message);
            }
        }
    }
}

impl Render for ValidationReport {
    fn render_text(&self) {
        if self.is_valid() {
            println!(
                "{} all {} expected parameter(s) exist under {}",
                style("OK").green().bold(),
                self.expected,
                self.namespace
            );
        } else {
            list("Missing parameters:", &self.missing);
        }
    }
}

impl Render for PruneReport {
    fn render_text(&self) {
        list("Deleted parameters:", &self.deleted_keys);
        list("Refused (still in use):", &self.refused_keys);
        list("Kept parameters:", &self.kept_keys);
        let deleted: Vec<String> = self.deleted_mappings.iter().map(|m| m.to_string()).collect();
        list("Deleted mappings:", &deleted);
        let kept: Vec<String> = self.kept_mappings.iter().map(|m| m.to_string()).collect();
        list("Kept mappings:", &kept);
    }
}

impl Render for RestoreReport {
    fn render_text(&self) {
        if self.cancelled {
            println!("Restore cancelled");
            return;
        }
        list("Restored:", &self.restored);
        list("Deleted:", &self.deleted);
        list("Kept:", &self.kept);
        list("Not restorable:", &self.unrestorable);
        println!("{} unchanged", self.unchanged.len());
    }
}

impl Render for PromoteReport {
    fn render_text(&self) {
        list("Promoted:", &self.promoted);
        list("Declined:", &self.declined);
        list("Skipped SecureString:", &self.skipped_secure);
        list("Denied:", &self.denied);
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
}

impl Render for Vec<DeleteResult> {
    fn render_text(&self) {
        for result in self {
            match &result.outcome {
                DeleteOutcome::Deleted => println!("{} {}", style("deleted").green(), result.name),
                DeleteOutcome::Aborted => println!("{} {}", style("kept").yellow(), result.name),
                DeleteOutcome::Refused(RefusalReason::ReplicationSource { destinations }) => {
                    println!(
                        "{} {}: source of {} mapping(s)",
                        style("refused").red(),
                        result.name,
                        destinations.len()
                    );
                    for mapping in destinations {
                        println!("    {}", mapping);
                    }
                }
                DeleteOutcome::Refused(RefusalReason::AccessDenied { message }) => {
                    println!("{} {}: {}", style("refused").red(), result.name, message);
                }
            }
        }
    }
}

/// Single-version restore result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRestore {
    pub name: String,
    /// Version written by the restore. Values are never printed.
    pub restored_version: Option<u64>,
}

impl Render for VersionRestore {
    fn render_text(&self) {
        match self.restored_version {
            Some(version) => println!("Restored {} as version {}", self.name, version),
            None => println!("{} left unchanged", self.name),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheBuild {
    pub env: String,
    pub names: Option<usize>,
    pub error: Option<String>,
}

impl Render for Vec<CacheBuild> {
    fn render_text(&self) {
        for build in self {
            match (&build.names, &build.error) {
                (Some(names), _) => println!("{}: {} name(s)", build.env, names),
                (None, Some(error)) => println!("{}: {}", build.env, style(error).red()),
                (None, None) => println!("{}: no result", build.env),
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shared {
    pub mapping: paramsync::ReplicationMapping,
}

impl Render for Shared {
    fn render_text(&self) {
        println!("Shared {}", self.mapping);
    }
}
