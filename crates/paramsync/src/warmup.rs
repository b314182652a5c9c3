//! Bounded worker pool for read-only warm-up work.
//!
//! Used to probe many parameters or prime several environments at once
//! before a run starts changing anything. [`WarmupPool::run`] returns only
//! after every worker has been joined, so no warm-up work can overlap a
//! mutation phase.

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::{bounded, unbounded};

use crate::cache::ParameterNameCache;
use crate::error::CacheError;
use crate::store::{probe, Presence, RemoteStore, StoreResult};

pub const DEFAULT_WORKERS: usize = 5;
pub const MAX_WORKERS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct WarmupPool {
    workers: usize,
}

impl Default for WarmupPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WarmupPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `task` for every item and returns `(item, result)` pairs in
    /// completion order.
    pub fn run<I, T, F>(&self, items: Vec<I>, task: F) -> Vec<(I, T)>
    where
        I: Send,
        T: Send,
        F: Fn(&I) -> T + Sync,
    {
        if items.is_empty() {
            return Vec::new();
        }
        let worker_count = self.workers.min(items.len());
        let (job_sender, job_receiver) = bounded::<I>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<(I, T)>();
        let task = &task;

        thread::scope(|scope| {
            for worker_id in 0..worker_count {
                let jobs = job_receiver.clone();
                let results = result_sender.clone();
                scope.spawn(move || {
                    tracing::trace!(worker_id, "Warm-up worker started");
                    for item in jobs.iter() {
                        let output = task(&item);
                        if results.send((item, output)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_receiver);
            drop(result_sender);

            for item in items {
                if job_sender.send(item).is_err() {
                    break;
                }
            }
            drop(job_sender);

            result_receiver.iter().collect()
        })
    }

    /// Probes the presence of every name. The first transport failure is
    /// returned; record-scoped failures are folded into [`Presence`].
    pub fn probe_all(
        &self,
        store: &dyn RemoteStore,
        names: Vec<String>,
    ) -> StoreResult<BTreeMap<String, Presence>> {
        let total = names.len();
        let mut presence = BTreeMap::new();
        for (name, result) in self.run(names, |name| probe(store, name)) {
            presence.insert(name, result?);
        }
        tracing::debug!(probed = total, workers = self.workers, "Presence warm-up complete");
        Ok(presence)
    }

    /// Refreshes the name cache of every environment and returns the number
    /// of names per environment.
    pub fn prime_name_caches(
        &self,
        caches: Vec<ParameterNameCache>,
    ) -> Vec<(String, Result<usize, CacheError>)> {
        self.run(caches, |cache| cache.get_names().map(|names| names.len()))
            .into_iter()
            .map(|(cache, result)| (cache.env().to_string(), result))
            .collect()
    }
}
