//! Runs a whole workload: filtering, pacing, interrupts and summaries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::bencher::Execute;
use crate::descriptor::BenchmarkDescriptor;
use crate::error::{BenchError, Result};
use crate::harness::{BenchConfig, CancelToken, RunHandle, Scheduler};
use crate::schema::Summary;
use crate::template::Template;

/// Which descriptors to run, by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    All,
    Names(BTreeSet<String>),
}

impl Filter {
    /// Space-separated names; the token `all` anywhere selects everything.
    pub fn parse(input: &str) -> Self {
        let names: BTreeSet<String> = input.split_whitespace().map(str::to_string).collect();
        if names.is_empty() || names.contains("all") {
            Filter::All
        } else {
            Filter::Names(names)
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Names(names) => names.contains(name),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summaries: Vec<Summary>,
    /// True when an interrupt stopped the run early.
    pub interrupted: bool,
    pub elapsed: Duration,
}

struct Pending<'a> {
    descriptor: &'a BenchmarkDescriptor,
    iterations: u64,
    handle: RunHandle,
}

pub struct Coordinator {
    system: String,
    config: BenchConfig,
    scheduler: Scheduler,
    cancel: CancelToken,
}

impl Coordinator {
    pub fn new(
        system: impl Into<String>,
        executor: Arc<dyn Execute>,
        config: BenchConfig,
        cancel: CancelToken,
    ) -> Self {
        let scheduler = Scheduler::new(executor, config.seed, cancel.clone());
        Self {
            system: system.into(),
            config,
            scheduler,
            cancel,
        }
    }

    /// Runs every descriptor accepted by `filter`, in order.
    ///
    /// All templates are compiled before the first statement executes, so a
    /// broken template aborts the run without touching the database.
    pub fn run(
        &self,
        descriptors: &[BenchmarkDescriptor],
        filter: &Filter,
    ) -> Result<RunOutcome> {
        let started = Instant::now();

        let selected = descriptors
            .iter()
            .filter(|d| filter.matches(&d.name))
            .map(|d| {
                Template::compile(&d.statement)
                    .map(|t| (d, Arc::new(t)))
                    .map_err(|source| BenchError::Template {
                        name: d.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if selected.is_empty() {
            warn!("no benchmark matched the filter");
        }

        let total = selected.len();
        let mut pending = Vec::with_capacity(total);
        for (i, (descriptor, template)) in selected.into_iter().enumerate() {
            let pause = i > 0 && !self.config.pause.is_zero();
            if self.cancel.is_cancelled() || (pause && self.cancel.sleep(self.config.pause)) {
                warn!(remaining = total - i, "interrupted, skipping remaining benchmarks");
                break;
            }

            let iterations = descriptor.effective_iterations(self.config.iterations);
            let workers = self.config.workers_for(iterations);
            if workers > self.config.workers {
                warn!(benchmark = %descriptor.name, workers, "increased worker count");
            } else if workers < self.config.workers {
                info!(
                    benchmark = %descriptor.name,
                    workers,
                    "reduced worker count to iteration count"
                );
            }

            info!(benchmark = %descriptor.name, mode = %descriptor.mode, iterations, "starting");
            let handle = self.scheduler.run_compiled(
                descriptor,
                template,
                self.config.iterations,
                workers,
            )?;

            if let RunHandle::Finished(result) = &handle {
                info!(
                    benchmark = %descriptor.name,
                    executions = result.count,
                    errors = result.errors,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "finished"
                );
            }

            pending.push(Pending {
                descriptor,
                iterations,
                handle,
            });
        }

        let mut summaries = Vec::with_capacity(pending.len());
        for p in pending {
            let result = match p.handle.join() {
                Ok(result) => result,
                Err(e) => {
                    error!(benchmark = %p.descriptor.name, "no summary: {e}");
                    continue;
                }
            };
            summaries.push(Summary::from_result(
                &self.system,
                p.descriptor,
                self.config.iterations,
                p.iterations,
                &result,
            ));
        }

        Ok(RunOutcome {
            summaries,
            interrupted: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
        })
    }
}
