//! One function per subcommand. Each returns whether the run succeeded;
//! errors are reserved for runs that could not complete.

use std::path::Path;

use anyhow::{bail, Context};
use paramsync::decision::{Decision, ScriptedDecision};
use paramsync::guard::DeletionGuard;
use paramsync::manifest::{load_manifest, load_replication_file};
use paramsync::orphans::OrphanDetector;
use paramsync::promote::PromoteRequest;
use paramsync::replication::ShareRequest;
use paramsync::restore::{parse_restore_time, PointInTimeRestorer, VersionRestorer};
use paramsync::sync::ReplicationOnlyRun;

use crate::context::CommandContext;
use crate::output::{emit, CacheBuild, DeleteResult, OutputFormat, Shared, VersionRestore};
use crate::prompt::{ask_text, TerminalDecision};

pub fn decision_for(ctx: &CommandContext, no_input: bool) -> Box<dyn Decision> {
    if no_input {
        Box::new(ScriptedDecision::declining())
    } else {
        Box::new(TerminalDecision::new(ctx.default_key_id()))
    }
}

pub fn sync(
    ctx: &CommandContext,
    config: &Path,
    replication_only: bool,
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let engine = ctx.engine()?;

    let report = if replication_only {
        let manifest = load_replication_file(config)?;
        ReplicationOnlyRun::new(&engine, ctx.rules()).run(&manifest, decision)?
    } else {
        let spec = load_manifest(config)?;
        engine.sync(&spec, decision)?
    };

    emit(format, &report)?;
    Ok(!report.errors_detected)
}

pub fn prune(
    ctx: &CommandContext,
    config: &Path,
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let spec = load_manifest(config)?;
    let report = OrphanDetector::new(ctx.index()?).prune(&spec, decision)?;
    emit(format, &report)?;
    Ok(true)
}

pub fn validate(ctx: &CommandContext, config: &Path, format: OutputFormat) -> anyhow::Result<bool> {
    let spec = load_manifest(config)?;
    let report = OrphanDetector::new(ctx.index()?).validate(&spec)?;
    emit(format, &report)?;
    Ok(report.is_valid())
}

pub fn restore_point_in_time(
    ctx: &CommandContext,
    prefix: Option<String>,
    time: Option<String>,
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let Some(prefix) = prefix else {
        bail!("--point-in-time requires --prefix");
    };
    let Some(time) = time else {
        bail!("--point-in-time requires --time");
    };
    let at = parse_restore_time(&time)?;

    let restorer =
        PointInTimeRestorer::new(ctx.index()?, ctx.settings.authorized_namespaces.clone());
    let report = restorer.restore(&prefix, at, decision)?;
    emit(format, &report)?;
    Ok(true)
}

pub fn restore_version(
    ctx: &CommandContext,
    name: Option<String>,
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let Some(name) = name else {
        bail!("restore requires --name, or --point-in-time with --prefix and --time");
    };

    let restorer = VersionRestorer::new(ctx.index()?, ctx.settings.authorized_namespaces.clone());
    let restored = restorer.restore(&name, decision)?;
    emit(
        format,
        &VersionRestore {
            name,
            restored_version: restored.map(|p| p.version),
        },
    )?;
    Ok(true)
}

pub fn promote(
    ctx: &CommandContext,
    prefix: Option<String>,
    to: Option<String>,
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let (Some(prefix), Some(to)) = (prefix, to) else {
        bail!("promote requires --prefix and --to");
    };
    let request = PromoteRequest {
        prefix,
        from_env: ctx.env.clone(),
        to_env: to,
        role: ctx.role().to_string(),
    };

    let report = paramsync::promote::promote(&ctx.registry, &request, decision)?;
    emit(format, &report)?;
    Ok(report.denied.is_empty())
}

pub fn share(
    ctx: &CommandContext,
    source: Option<String>,
    destination: Option<String>,
    no_input: bool,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let source = required(source, "Source parameter", no_input)?;
    let destination = required(destination, "Destination parameter", no_input)?;

    let request = ShareRequest {
        source,
        destination,
        env: ctx.env.clone(),
        user: ctx.user.clone(),
    };
    let mapping = paramsync::replication::share(&ctx.index()?, &ctx.rules(), &request)?;
    emit(format, &Shared { mapping })?;
    Ok(true)
}

fn required(value: Option<String>, prompt: &str, no_input: bool) -> anyhow::Result<String> {
    match value {
        Some(value) => Ok(value),
        None if no_input => bail!("{} is required", prompt),
        None => ask_text(prompt),
    }
}

pub fn delete(
    ctx: &CommandContext,
    names: &[String],
    decision: &mut dyn Decision,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let guard = DeletionGuard::new(ctx.index()?);
    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let outcome = guard
            .delete(name, decision)
            .with_context(|| format!("Failed to delete {}", name))?;
        if let Some(locked) = outcome.source_locked(name) {
            tracing::error!(error = %locked, "Deletion refused");
        }
        results.push(DeleteResult {
            name: name.clone(),
            outcome,
        });
    }

    emit(format, &results)?;
    Ok(results.iter().all(|r| r.outcome.is_deleted()))
}

pub fn build_cache(ctx: &CommandContext, wipe: bool, format: OutputFormat) -> anyhow::Result<bool> {
    let mut caches = Vec::with_capacity(ctx.settings.environments.len());
    for env in &ctx.settings.environments {
        let cache = ctx.name_cache(env)?;
        if wipe {
            cache.wipe()?;
        }
        caches.push(cache);
    }

    let mut builds: Vec<CacheBuild> = ctx
        .warmup()
        .prime_name_caches(caches)
        .into_iter()
        .map(|(env, result)| match result {
            Ok(names) => CacheBuild {
                env,
                names: Some(names),
                error: None,
            },
            Err(e) => CacheBuild {
                env,
                names: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    builds.sort_by(|a, b| a.env.cmp(&b.env));

    emit(format, &builds)?;
    Ok(builds.iter().all(|b| b.error.is_none()))
}
